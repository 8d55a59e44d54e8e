use crate::{arm::ResourceManagerClient, CancellationToken, Error};
use page_turner::PageTurner;
use page_turner::PageTurnerOutput;
use page_turner::TurnedPage;

/// A request for one page of an ARM listing. Used in
/// [`page_turner::PageTurner`] to follow `nextLink` pagination.
pub struct PageRequest {
    pub url: url::Url,
    pub cancel: CancellationToken,
}

/// Split a response body into its page items and next link.
/// A body without a `value` array is itself the only item.
pub fn split_page(mut body: serde_json::Value) -> (Vec<serde_json::Value>, Option<String>) {
    let next_link = body
        .get("nextLink")
        .and_then(serde_json::Value::as_str)
        .filter(|link| !link.is_empty())
        .map(str::to_string);

    let items = match body.get_mut("value") {
        Some(serde_json::Value::Array(items)) => std::mem::take(items),
        _ => vec![body],
    };
    (items, next_link)
}

#[async_trait::async_trait]
impl PageTurner<PageRequest> for ResourceManagerClient {
    type PageItem = serde_json::Value;
    type PageError = Error;

    async fn turn_page(&self, request: PageRequest) -> PageTurnerOutput<Self, PageRequest> {
        let PageRequest { url, cancel } = request;

        let body = self.get_json(url.clone(), &cancel).await?;
        let (items, next_link) = split_page(body);

        match next_link {
            // An empty page ends the listing even if it links onwards,
            // so a misbehaving service cannot loop us forever.
            Some(next_link) if !items.is_empty() => {
                tracing::debug!(%url, %next_link, items = items.len(), "following next page link");
                let url = self.resolve_url(&next_link)?;
                Ok(TurnedPage::next(items, PageRequest { url, cancel }))
            }
            _ => Ok(TurnedPage::last(items)),
        }
    }
}
