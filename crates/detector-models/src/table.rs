use crate::Error;
use chrono::{DateTime, Utc};

/// Type of a DataTable column, as tagged by the telemetry query APIs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    DateTime,
    Dynamic,
    Guid,
    Int,
    Long,
    Real,
    String,
    TimeSpan,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::DateTime => "datetime",
            ColumnType::Dynamic => "dynamic",
            ColumnType::Guid => "guid",
            ColumnType::Int => "int",
            ColumnType::Long => "long",
            ColumnType::Real => "real",
            ColumnType::String => "string",
            ColumnType::TimeSpan => "timespan",
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "bool" => ColumnType::Bool,
            "datetime" => ColumnType::DateTime,
            "dynamic" => ColumnType::Dynamic,
            "guid" => ColumnType::Guid,
            "int" => ColumnType::Int,
            "long" => ColumnType::Long,
            "real" => ColumnType::Real,
            "string" => ColumnType::String,
            "timespan" => ColumnType::TimeSpan,
            _ => return Err(Error::UnsupportedColumnType(s.to_string())),
        })
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A single typed cell of a DataTable.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    DateTime(DateTime<Utc>),
    Dynamic(serde_json::Value),
    Guid(uuid::Uuid),
    Int(i32),
    Long(i64),
    Real(f64),
    String(String),
    #[serde(serialize_with = "serialize_timespan")]
    TimeSpan(chrono::Duration),
}

impl Value {
    /// Decode a JSON cell of a query response into a Value of `column_type`.
    pub fn from_json(column_type: ColumnType, json: serde_json::Value) -> Result<Self, Error> {
        use serde_json::Value as J;

        let invalid = |json: &J| Error::InvalidValue {
            column_type,
            value: json.to_string(),
        };

        let value = match (column_type, json) {
            (_, J::Null) => Value::Null,
            (ColumnType::Bool, J::Bool(b)) => Value::Bool(b),
            (ColumnType::Bool, J::Number(n)) if n.as_i64() == Some(0) => Value::Bool(false),
            (ColumnType::Bool, J::Number(n)) if n.as_i64() == Some(1) => Value::Bool(true),
            (ColumnType::Bool, J::String(s)) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
            (ColumnType::Bool, J::String(s)) if s.eq_ignore_ascii_case("false") => {
                Value::Bool(false)
            }
            (ColumnType::DateTime, J::String(s)) => match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => Value::DateTime(dt.with_timezone(&Utc)),
                Err(_) => return Err(invalid(&J::String(s))),
            },
            (ColumnType::Dynamic, J::String(s)) => match serde_json::from_str(&s) {
                Ok(doc) => Value::Dynamic(doc),
                Err(_) => Value::Dynamic(J::String(s)),
            },
            (ColumnType::Dynamic, doc) => Value::Dynamic(doc),
            (ColumnType::Guid, J::String(s)) => match uuid::Uuid::parse_str(&s) {
                Ok(guid) => Value::Guid(guid),
                Err(_) => return Err(invalid(&J::String(s))),
            },
            (ColumnType::Int, J::Number(n)) => match n.as_i64().and_then(|i| i32::try_from(i).ok())
            {
                Some(i) => Value::Int(i),
                None => return Err(invalid(&J::Number(n))),
            },
            (ColumnType::Long, J::Number(n)) => match n.as_i64() {
                Some(i) => Value::Long(i),
                None => return Err(invalid(&J::Number(n))),
            },
            (ColumnType::Real, J::Number(n)) => match n.as_f64() {
                Some(f) => Value::Real(f),
                None => return Err(invalid(&J::Number(n))),
            },
            (ColumnType::Real, J::String(s)) => match s.as_str() {
                "NaN" => Value::Real(f64::NAN),
                "Infinity" => Value::Real(f64::INFINITY),
                "-Infinity" => Value::Real(f64::NEG_INFINITY),
                _ => return Err(invalid(&J::String(s))),
            },
            (ColumnType::String, J::String(s)) => Value::String(s),
            (ColumnType::String, other) => Value::String(other.to_string()),
            (ColumnType::TimeSpan, J::String(s)) => match parse_timespan(&s) {
                Some(d) => Value::TimeSpan(d),
                None => return Err(invalid(&J::String(s))),
            },
            (_, other) => return Err(invalid(&other)),
        };
        Ok(value)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

lazy_static::lazy_static! {
    static ref TIMESPAN_RE: regex::Regex = regex::Regex::new(
        r"^(-)?(?:(\d+)\.)?(\d{1,2}):(\d{2}):(\d{2})(?:\.(\d{1,7}))?$"
    ).unwrap();
}

/// Parse a `[-][d.]hh:mm:ss[.fffffff]` time span.
pub(crate) fn parse_timespan(s: &str) -> Option<chrono::Duration> {
    let caps = TIMESPAN_RE.captures(s)?;
    let num = |i: usize| -> Option<i64> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };

    let (days, hours, minutes, seconds) = (num(2)?, num(3)?, num(4)?, num(5)?);
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }
    // Fractions are in 100ns ticks, right-padded to seven digits.
    let nanos = match caps.get(6) {
        Some(m) => format!("{:0<7}", m.as_str()).parse::<i64>().ok()? * 100,
        None => 0,
    };

    // Day counts beyond the range of a Duration are rejected.
    let total = chrono::Duration::try_days(days)?
        .checked_add(&chrono::Duration::try_hours(hours)?)?
        .checked_add(&chrono::Duration::try_minutes(minutes)?)?
        .checked_add(&chrono::Duration::try_seconds(seconds)?)?
        .checked_add(&chrono::Duration::nanoseconds(nanos))?;

    Some(if caps.get(1).is_some() { -total } else { total })
}

/// Render a time span in the `[-][d.]hh:mm:ss[.fffffff]` form.
pub(crate) fn format_timespan(d: &chrono::Duration) -> String {
    let (sign, d) = if *d < chrono::Duration::zero() {
        ("-", -*d)
    } else {
        ("", *d)
    };
    let days = d.num_days();
    let hours = d.num_hours() % 24;
    let minutes = d.num_minutes() % 60;
    let seconds = d.num_seconds() % 60;
    let ticks = (d - chrono::Duration::seconds(d.num_seconds()))
        .num_nanoseconds()
        .unwrap_or(0)
        / 100;

    let mut out = String::from(sign);
    if days != 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if ticks != 0 {
        out.push_str(&format!(".{ticks:07}"));
    }
    out
}

fn serialize_timespan<S: serde::Serializer>(
    d: &chrono::Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timespan(d))
}

/// DataTable is a named, ordered set of typed columns and rows of cells.
/// Every row has exactly one cell per column.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct DataTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cell of `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// Merge `other` into this table. The merged schema is the union of both
    /// column sets: columns unknown to `self` are appended, and rows of either
    /// side which lack a column hold Null in it. Rows of `other` are appended
    /// after existing rows and are never de-duplicated.
    pub fn merge(&mut self, other: DataTable) {
        let DataTable { columns, rows, .. } = other;

        let mut mapping = Vec::with_capacity(columns.len());
        for column in columns {
            let index = match self.column_index(&column.name) {
                Some(index) => index,
                None => {
                    self.columns.push(column);
                    for row in self.rows.iter_mut() {
                        row.push(Value::Null);
                    }
                    self.columns.len() - 1
                }
            };
            mapping.push(index);
        }

        let width = self.columns.len();
        for row in rows {
            let mut merged = vec![Value::Null; width];
            for (value, &index) in row.into_iter().zip(mapping.iter()) {
                merged[index] = value;
            }
            self.rows.push(merged);
        }
    }
}

/// Merge a result set of tables into an accumulated set.
/// An empty accumulator takes `next` as-is; otherwise tables are merged
/// pairwise by position and surplus tables of `next` are appended.
pub fn merge_table_sets(acc: &mut Vec<DataTable>, next: Vec<DataTable>) {
    if acc.is_empty() {
        *acc = next;
        return;
    }
    for (index, table) in next.into_iter().enumerate() {
        match acc.get_mut(index) {
            Some(existing) => existing.merge(table),
            None => acc.push(table),
        }
    }
}
