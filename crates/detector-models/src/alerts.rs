use crate::{Error, ResourceIdentifier};
use std::time::Duration;

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub enum ChartType {
    Line,
    Bar,
    StackedBar,
    Area,
}

/// How an alert property is presented. Each kind carries the display
/// settings that kind needs, fixed when the property is declared.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind")]
pub enum PropertyKind {
    Text,
    LongText,
    KeyValue {
        show_headers: bool,
    },
    Table {
        columns: Vec<String>,
        show_headers: bool,
    },
    Chart {
        chart_type: ChartType,
        x_axis: String,
        y_axes: Vec<String>,
    },
    Link {
        text: String,
    },
}

/// AlertProperty is one displayed value of an Alert.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AlertProperty {
    pub name: String,
    pub display_name: String,
    pub order: u8,
    pub kind: PropertyKind,
    pub value: serde_json::Value,
}

impl AlertProperty {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        order: u8,
        kind: PropertyKind,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            order,
            kind,
            value: value.into(),
        }
    }

    pub fn text(
        name: impl Into<String>,
        display_name: impl Into<String>,
        order: u8,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self::new(name, display_name, order, PropertyKind::Text, value)
    }
}

/// Alert is a finding emitted by a detector for a single resource.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Alert {
    pub title: String,
    pub resource_identifier: ResourceIdentifier,
    /// Properties in presentation order.
    pub properties: Vec<AlertProperty>,
}

impl Alert {
    pub fn builder(
        title: impl Into<String>,
        resource_identifier: ResourceIdentifier,
    ) -> AlertBuilder {
        AlertBuilder {
            title: title.into(),
            resource_identifier,
            properties: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&AlertProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

pub struct AlertBuilder {
    title: String,
    resource_identifier: ResourceIdentifier,
    properties: Vec<AlertProperty>,
}

impl AlertBuilder {
    pub fn property(mut self, property: AlertProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn build(self) -> Result<Alert, Error> {
        let AlertBuilder {
            title,
            resource_identifier,
            mut properties,
        } = self;

        if title.trim().is_empty() {
            return Err(Error::EmptyAlertTitle);
        }
        for (index, property) in properties.iter().enumerate() {
            if properties[..index].iter().any(|p| p.name == property.name) {
                return Err(Error::DuplicateAlertProperty(property.name.clone()));
            }
        }
        // Stable: properties of equal order keep their declaration order.
        properties.sort_by_key(|p| p.order);

        Ok(Alert {
            title,
            resource_identifier,
            properties,
        })
    }
}

/// Outcome of a detector's analysis run.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Analysis completed, emitting zero or more alerts.
    Alerts(Vec<Alert>),
    /// The detector's data isn't ready yet, and the run should be
    /// attempted again after `retry_after`.
    NotReady { retry_after: Duration, reason: String },
}
