use detector_models::{DataTable, Value};
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

#[derive(clap::Args, Clone, Debug, Default)]
pub struct Output {
    /// How to format CLI output.
    /// Defaults to a table if stdout is a terminal, and JSON otherwise.
    #[clap(global = true, short, long, value_enum)]
    pub output: Option<OutputType>,
}

#[derive(clap::ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputType {
    /// Format output as compact JSON with items separated by newlines
    Json,
    /// Format output as YAML
    Yaml,
    /// Format the output as a pretty-printed table
    Table,
}

impl Output {
    pub fn output_type(&self) -> OutputType {
        match self.output {
            Some(output) => output,
            None if io::stdout().is_terminal() => OutputType::Table,
            None => OutputType::Json,
        }
    }

    /// Print `items`, using `to_table` to build the table form.
    pub fn print<T: Serialize>(
        &self,
        items: &[T],
        to_table: impl FnOnce(&[T]) -> comfy_table::Table,
    ) -> anyhow::Result<()> {
        match self.output_type() {
            OutputType::Json => print_json(items),
            OutputType::Yaml => print_yaml(items),
            OutputType::Table => print_table(&to_table(items)),
        }
    }

    /// Print the tables of a telemetry query.
    pub fn print_data_tables(&self, tables: &[DataTable]) -> anyhow::Result<()> {
        match self.output_type() {
            OutputType::Json => print_json(tables),
            OutputType::Yaml => print_yaml(tables),
            OutputType::Table => {
                for table in tables {
                    println!("{} ({} rows)", table.name, table.rows.len());
                    print_table(&data_table(table))?;
                }
                Ok(())
            }
        }
    }
}

pub fn print_json<T: Serialize>(items: &[T]) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for item in items {
        serde_json::to_writer(&mut stdout, item)?;
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

pub fn print_yaml<T: Serialize>(items: &[T]) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for item in items {
        serde_yaml::to_writer(&mut stdout, item)?;
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

pub fn print_table(table: &comfy_table::Table) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for line in table.lines() {
        stdout.write_all(line.as_bytes())?;
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

pub fn new_table(headers: Vec<&str>) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .apply_modifier(comfy_table::modifiers::UTF8_SOLID_INNER_BORDERS);

    table.set_header(headers);
    table
}

fn data_table(table: &DataTable) -> comfy_table::Table {
    let mut out = new_table(table.columns.iter().map(|c| c.name.as_str()).collect());
    for row in &table.rows {
        out.add_row(row.iter().map(cell_text).collect::<Vec<_>>());
    }
    out
}

/// Text of a table cell. Nulls are empty and strings are unquoted.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => match serde_json::to_value(other) {
            Ok(serde_json::Value::String(s)) => s,
            Ok(doc) => doc.to_string(),
            Err(_) => format!("{other:?}"),
        },
    }
}

/// Text of a JSON document at `pointer`, for use as a table cell.
pub fn json_cell(doc: &serde_json::Value, pointer: &str) -> String {
    match doc.pointer(pointer) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
