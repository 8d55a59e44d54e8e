use crate::{CancellationToken, Error};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: url::Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Request {
    pub fn get(url: url::Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: url::Url, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Value of the first header of `name`, matched case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received HTTP response of any status.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: bytes::Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<bytes::Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self, context: &str) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|source| Error::Parse {
            context: context.to_string(),
            source,
        })
    }
}

/// Transport sends a single HTTP request and returns its response,
/// whatever its status. It does not retry.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, Error>;
}

#[async_trait::async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        let Request {
            method,
            url,
            headers,
            body,
        } = request;

        let map_err = |source| Error::Transport {
            method: method.clone(),
            url: url.to_string(),
            source,
        };

        let mut builder = self.request(method.clone(), url.clone());
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(map_err)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_err)?;

        Ok(Response { status, body })
    }
}

pub fn new_http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, Error> {
    reqwest::ClientBuilder::new()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(Error::ClientBuild)
}

/// HttpClient sends requests through a Transport, bounding each one by a
/// timeout and aborting it if the caller's CancellationToken fires.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request`, returning its response whatever the status.
    pub async fn send(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, Error> {
        let (method, url) = (request.method.clone(), request.url.to_string());
        tracing::debug!(%method, %url, "sending request");

        tokio::select! {
            biased;

            () = cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(self.timeout, self.transport.send(request)) => match result {
                Ok(result) => result,
                Err(_elapsed) => Err(Error::Timeout {
                    method,
                    url,
                    timeout: self.timeout,
                }),
            },
        }
    }

    /// Send `request`, mapping a non-success status into Error::Http.
    pub async fn send_checked(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, Error> {
        let (method, url) = (request.method.clone(), request.url.to_string());
        let response = self.send(request, cancel).await?;

        if response.status.is_success() {
            tracing::trace!(%method, %url, status = %response.status, "got successful response");
            Ok(response)
        } else {
            Err(Error::Http {
                method,
                url,
                status: response.status,
                body: response.text(),
            })
        }
    }
}
