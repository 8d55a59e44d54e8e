use crate::{Error, TelemetryDataError};
use detector_models::{Column, ColumnType, DataTable, TelemetryDbType, Value};
use reqwest::StatusCode;

/// Body of a telemetry query request.
#[derive(Debug, serde::Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timespan: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<String>,
}

impl QueryRequest {
    pub fn new(
        db_type: TelemetryDbType,
        query: &str,
        timespan: Option<std::time::Duration>,
        additional: Vec<String>,
    ) -> Self {
        let (workspaces, applications) = match db_type {
            TelemetryDbType::LogAnalytics => (additional, Vec::new()),
            TelemetryDbType::ApplicationInsights => (Vec::new(), additional),
        };
        Self {
            query: query.to_string(),
            timespan: timespan.map(iso8601_duration),
            workspaces,
            applications,
        }
    }
}

#[derive(serde::Deserialize)]
struct QueryResponse {
    #[serde(default)]
    tables: Vec<RawTable>,
}

#[derive(serde::Deserialize)]
struct RawTable {
    name: String,
    columns: Vec<RawColumn>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(serde::Deserialize)]
struct RawColumn {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
}

#[derive(serde::Deserialize)]
struct ErrorResponse {
    error: RawError,
}

#[derive(serde::Deserialize)]
struct RawError {
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default, alias = "innerError")]
    innererror: Option<Box<RawError>>,
}

impl From<RawError> for TelemetryDataError {
    fn from(err: RawError) -> Self {
        TelemetryDataError {
            code: err.code,
            message: err.message,
            inner: err.innererror.map(|inner| Box::new((*inner).into())),
        }
    }
}

/// Parse the tables of a successful query response.
/// Columns of an unsupported type fail the parse.
pub fn parse_tables(body: &[u8]) -> Result<Vec<DataTable>, Error> {
    let response: QueryResponse = serde_json::from_slice(body).map_err(|source| Error::Parse {
        context: "telemetry query".to_string(),
        source,
    })?;

    let mut tables = Vec::with_capacity(response.tables.len());
    for RawTable {
        name,
        columns,
        rows,
    } in response.tables
    {
        let columns = columns
            .into_iter()
            .map(|RawColumn { name, column_type }| -> Result<Column, Error> {
                Ok(Column::new(name, column_type.parse::<ColumnType>()?))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut table = DataTable::new(name, columns);
        for row in rows {
            if row.len() != table.columns.len() {
                return Err(Error::Malformed {
                    context: format!("telemetry table {}", table.name),
                    detail: format!(
                        "row has {} cells but the table has {} columns",
                        row.len(),
                        table.columns.len()
                    ),
                });
            }
            let row = row
                .into_iter()
                .zip(table.columns.iter())
                .map(|(cell, column)| Value::from_json(column.column_type, cell))
                .collect::<Result<Vec<_>, _>>()?;
            table.rows.push(row);
        }
        tables.push(table);
    }
    Ok(tables)
}

/// Parse the error of a failed query response. A body which isn't a
/// structured error is surfaced with the status as its code.
pub fn parse_error(status: StatusCode, body: &[u8]) -> TelemetryDataError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(ErrorResponse { error }) => error.into(),
        Err(_) => TelemetryDataError {
            code: status.as_u16().to_string(),
            message: String::from_utf8_lossy(body).into_owned(),
            inner: None,
        },
    }
}

/// Render a duration in ISO 8601 form, e.g. `PT1H`, `P1DT2H30M`, `PT0.5S`.
pub fn iso8601_duration(d: std::time::Duration) -> String {
    let total = d.as_secs();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total / 3_600 % 24,
        total / 60 % 60,
        total % 60,
    );
    let millis = d.subsec_millis();

    let mut out = String::from("P");
    if days != 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours != 0 || minutes != 0 || seconds != 0 || millis != 0 || days == 0 {
        out.push('T');
    }
    if hours != 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes != 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if millis != 0 {
        let frac = format!("{:03}", millis);
        out.push_str(&format!("{seconds}.{}S", frac.trim_end_matches('0')));
    } else if seconds != 0 || (days == 0 && hours == 0 && minutes == 0) {
        out.push_str(&format!("{seconds}S"));
    }
    out
}
