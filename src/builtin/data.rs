//! Data tools: CSV statistics, JSON inspection, report generation.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;
use tokio::io::AsyncReadExt;

use crate::guard::{AccessMode, PathKind};
use crate::tools::{
    CallContext, HandlerError, RegistryError, Schema, SideEffectClass, ToolDescriptor,
    ToolRegistry, ValidatedArguments,
};
use crate::types::SandboxConfig;

const SAMPLE_ROWS: usize = 5;
const TOP_VALUES: usize = 10;
const TRANSFORM_KEEP: usize = 10;
const STRUCTURE_VALUE_CHARS: usize = 100;
const MAX_STRUCTURE_DEPTH: usize = 32;

/// Cell spellings treated as missing.
const MISSING_MARKERS: [&str; 6] = ["", "na", "n/a", "nan", "null", "none"];

// =============================================================================
// CSV reading
// =============================================================================

/// Minimal RFC 4180 reader: quoted fields, doubled quotes, CRLF or LF.
struct CsvReader<'a> {
    chars: Peekable<Chars<'a>>,
    delimiter: char,
}

impl<'a> CsvReader<'a> {
    fn new(text: &'a str, delimiter: char) -> Self {
        Self {
            chars: text.chars().peekable(),
            delimiter,
        }
    }

    fn next_record(&mut self) -> Option<Vec<String>> {
        self.chars.peek()?;

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut at_field_start = true;

        while let Some(c) = self.chars.next() {
            if in_quotes {
                if c == '"' {
                    if self.chars.peek() == Some(&'"') {
                        self.chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    field.push(c);
                }
                continue;
            }

            match c {
                '"' if at_field_start => {
                    in_quotes = true;
                    at_field_start = false;
                }
                c if c == self.delimiter => {
                    fields.push(std::mem::take(&mut field));
                    at_field_start = true;
                }
                '\r' | '\n' => {
                    if c == '\r' && self.chars.peek() == Some(&'\n') {
                        self.chars.next();
                    }
                    fields.push(field);
                    return Some(fields);
                }
                c => {
                    field.push(c);
                    at_field_start = false;
                }
            }
        }
        fields.push(field);
        Some(fields)
    }
}

struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn read_table(text: &str, delimiter: char, max_rows: usize) -> Result<Table, HandlerError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = CsvReader::new(text, delimiter);

    let columns = loop {
        match reader.next_record() {
            Some(record) if is_blank(&record) => continue,
            Some(record) => break record.into_iter().map(|c| c.trim().to_string()).collect::<Vec<_>>(),
            None => return Err(HandlerError::invalid_input("CSV file is empty")),
        }
    };

    let mut rows = Vec::new();
    let mut line = 1;
    while rows.len() < max_rows {
        let Some(mut record) = reader.next_record() else {
            break;
        };
        line += 1;
        if is_blank(&record) {
            continue;
        }
        if record.len() > columns.len() {
            return Err(HandlerError::invalid_input(format!(
                "row {line} has {} fields, expected {}",
                record.len(),
                columns.len()
            )));
        }
        record.resize(columns.len(), String::new());
        rows.push(record);
    }
    Ok(Table { columns, rows })
}

fn is_blank(record: &[String]) -> bool {
    record.len() == 1 && record[0].trim().is_empty()
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m))
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}

// =============================================================================
// Column statistics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Number,
    Text,
    Empty,
}

impl ColumnType {
    fn name(self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Number => "number",
            ColumnType::Text => "string",
            ColumnType::Empty => "empty",
        }
    }

    fn infer<'a>(present: impl Iterator<Item = &'a str> + Clone) -> Self {
        if present.clone().next().is_none() {
            return ColumnType::Empty;
        }
        if !present.clone().all(|c| parse_number(c).is_some()) {
            return ColumnType::Text;
        }
        if present.into_iter().all(|c| c.trim().parse::<i64>().is_ok()) {
            ColumnType::Integer
        } else {
            ColumnType::Number
        }
    }
}

/// Linear interpolation between closest ranks, over sorted input.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn numeric_stats(values: &[f64]) -> Value {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std = (sorted.len() > 1).then(|| {
        let var = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    });
    let mut unique = sorted.clone();
    unique.dedup();

    json!({
        "mean": mean,
        "median": quantile(&sorted, 0.5),
        "std": std,
        "min": sorted[0],
        "max": sorted[sorted.len() - 1],
        "q25": quantile(&sorted, 0.25),
        "q75": quantile(&sorted, 0.75),
        "unique_count": unique.len(),
    })
}

fn categorical_stats(values: &[&str]) -> Value {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, v) in values.iter().enumerate() {
        counts.entry(*v).or_insert((0, i)).0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> = counts.into_iter().map(|(v, (c, first))| (v, c, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    json!({
        "unique_count": ranked.len(),
        "most_common": ranked
            .iter()
            .take(TOP_VALUES)
            .map(|(value, count, _)| json!({"value": value, "count": count}))
            .collect::<Vec<_>>(),
        "sample_values": values.iter().take(SAMPLE_ROWS).collect::<Vec<_>>(),
    })
}

fn cell_value(cell: &str, column: ColumnType) -> Value {
    if is_missing(cell) {
        return Value::Null;
    }
    match column {
        ColumnType::Integer | ColumnType::Number => {
            parse_number(cell).map_or(Value::Null, super::calc::number)
        }
        _ => Value::String(cell.to_string()),
    }
}

fn analyze_table(table: &Table) -> Value {
    let total_rows = table.rows.len();
    let mut data_types = Map::new();
    let mut missing_values = Map::new();
    let mut numeric = Map::new();
    let mut categorical = Map::new();
    let mut types = Vec::with_capacity(table.columns.len());

    for (i, name) in table.columns.iter().enumerate() {
        let present = table.rows.iter().map(|r| r[i].as_str()).filter(|c| !is_missing(c));
        let column_type = ColumnType::infer(present.clone());
        types.push(column_type);

        let missing = total_rows - present.clone().count();
        let percentage = if total_rows == 0 {
            0.0
        } else {
            missing as f64 / total_rows as f64 * 100.0
        };
        data_types.insert(name.clone(), json!(column_type.name()));
        missing_values.insert(name.clone(), json!({"count": missing, "percentage": percentage}));

        match column_type {
            ColumnType::Integer | ColumnType::Number => {
                let values: Vec<f64> = present.filter_map(parse_number).collect();
                numeric.insert(name.clone(), numeric_stats(&values));
            }
            ColumnType::Text => {
                let values: Vec<&str> = present.map(str::trim).collect();
                categorical.insert(name.clone(), categorical_stats(&values));
            }
            ColumnType::Empty => {}
        }
    }

    let sample: Vec<Value> = table
        .rows
        .iter()
        .take(SAMPLE_ROWS)
        .map(|row| {
            let record: Map<String, Value> = table
                .columns
                .iter()
                .zip(row)
                .zip(&types)
                .map(|((name, cell), ty)| (name.clone(), cell_value(cell, *ty)))
                .collect();
            Value::Object(record)
        })
        .collect();

    json!({
        "total_rows": total_rows,
        "total_columns": table.columns.len(),
        "column_names": table.columns,
        "data_types": data_types,
        "missing_values": missing_values,
        "numeric_statistics": numeric,
        "categorical_statistics": categorical,
        "sample_data": sample,
    })
}

#[derive(Debug, Deserialize)]
struct CsvArgs {
    file_path: String,
    delimiter: String,
    max_rows: usize,
}

/// Read a UTF-8 file, refusing anything larger than `max_bytes`. The read
/// itself is bounded too, so a file growing after the size check cannot
/// exceed the limit.
async fn read_capped(path: &std::path::Path, max_bytes: u64) -> Result<String, HandlerError> {
    let too_large = || HandlerError::invalid_input(format!("file is larger than {max_bytes} bytes"));

    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > max_bytes {
        return Err(too_large());
    }
    let file = tokio::fs::File::open(path).await?;
    let mut text = String::new();
    file.take(max_bytes.saturating_add(1))
        .read_to_string(&mut text)
        .await?;
    if text.len() as u64 > max_bytes {
        return Err(too_large());
    }
    Ok(text)
}

async fn analyze_csv(
    args: ValidatedArguments,
    ctx: CallContext,
    max_bytes: u64,
) -> Result<Value, HandlerError> {
    let CsvArgs {
        file_path,
        delimiter,
        max_rows,
    } = args.parse()?;

    let mut chars = delimiter.chars();
    let delimiter = match (chars.next(), chars.next()) {
        (Some(c), None) if c != '"' && c != '\n' && c != '\r' => c,
        _ => return Err(HandlerError::invalid_input("delimiter must be a single character")),
    };

    let guarded = ctx.read_file(&file_path)?;
    let text = read_capped(guarded.as_path(), max_bytes).await?;
    let table = read_table(&text, delimiter, max_rows)?;

    let mut report = analyze_table(&table);
    if let Value::Object(map) = &mut report {
        map.insert("file_path".into(), json!(file_path));
        map.insert("analysis_timestamp".into(), json!(Utc::now().to_rfc3339()));
    }
    Ok(report)
}

// =============================================================================
// JSON processing
// =============================================================================

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn structure(value: &Value, path: &str, depth: usize) -> Value {
    if depth >= MAX_STRUCTURE_DEPTH {
        return json!({"type": type_name(value), "path": path, "truncated": true});
    }
    match value {
        Value::Object(map) => {
            let children: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), structure(v, &format!("{path}.{k}"), depth + 1)))
                .collect();
            json!({
                "type": "object",
                "path": path,
                "keys": map.keys().collect::<Vec<_>>(),
                "key_count": map.len(),
                "children": children,
            })
        }
        Value::Array(items) => {
            let mut element_types: Vec<&str> = items.iter().map(type_name).collect();
            element_types.sort_unstable();
            element_types.dedup();
            json!({
                "type": "array",
                "path": path,
                "length": items.len(),
                "element_types": element_types,
                "sample_element": items.first().map(|first| structure(first, &format!("{path}[0]"), depth + 1)),
            })
        }
        Value::String(s) if s.chars().count() >= STRUCTURE_VALUE_CHARS => {
            let cut: String = s.chars().take(STRUCTURE_VALUE_CHARS).collect();
            json!({"type": "string", "path": path, "value": format!("{cut}...")})
        }
        scalar => json!({"type": type_name(scalar), "path": path, "value": scalar}),
    }
}

/// Follow a dotted path; numeric segments index arrays.
fn extract<'v>(value: &'v Value, json_path: &str) -> Result<&'v Value, HandlerError> {
    json_path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map
            .get(segment)
            .ok_or_else(|| HandlerError::invalid_input(format!("key '{segment}' not found"))),
        Value::Array(items) => {
            let index: usize = segment
                .parse()
                .map_err(|_| HandlerError::invalid_input(format!("invalid array index: {segment}")))?;
            items
                .get(index)
                .ok_or_else(|| HandlerError::invalid_input(format!("index {index} out of range")))
        }
        other => Err(HandlerError::invalid_input(format!(
            "cannot access '{segment}' on {}",
            type_name(other)
        ))),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum JsonOperation {
    Analyze,
    Extract,
    Transform,
}

#[derive(Debug, Deserialize)]
struct JsonArgs {
    file_path: String,
    operation: JsonOperation,
    json_path: Option<String>,
}

async fn process_json(
    args: ValidatedArguments,
    ctx: CallContext,
    max_bytes: u64,
) -> Result<Value, HandlerError> {
    let JsonArgs {
        file_path,
        operation,
        json_path,
    } = args.parse()?;

    let guarded = ctx.read_file(&file_path)?;
    let text = read_capped(guarded.as_path(), max_bytes).await?;
    let file_size = text.len();
    let data: Value = serde_json::from_str(&text)
        .map_err(|e| HandlerError::invalid_input(format!("invalid JSON: {e}")))?;

    let mut result = json!({
        "file_path": file_path,
        "file_size": file_size,
        "processing_timestamp": Utc::now().to_rfc3339(),
    });
    let extra = match operation {
        JsonOperation::Analyze => json!({
            "operation": "analyze",
            "structure": structure(&data, "root", 0),
            "root_type": type_name(&data),
            "is_valid": true,
        }),
        JsonOperation::Extract => {
            let json_path = json_path
                .filter(|p| !p.is_empty())
                .ok_or_else(|| HandlerError::invalid_input("json_path is required for extract"))?;
            let extracted = extract(&data, &json_path)?;
            json!({
                "operation": "extract",
                "json_path": json_path,
                "extracted_data": extracted,
                "extracted_type": type_name(extracted),
            })
        }
        JsonOperation::Transform => match &data {
            Value::Array(items) => json!({
                "operation": "transform",
                "original_length": items.len(),
                "transformed_data": items.iter().take(TRANSFORM_KEEP).collect::<Vec<_>>(),
                "transformation": "truncate_to_10",
            }),
            Value::Object(map) => json!({
                "operation": "transform",
                "original_keys": map.keys().collect::<Vec<_>>(),
                "transformed_data": map
                    .iter()
                    .filter(|(k, _)| !k.starts_with('_'))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Map<String, Value>>(),
                "transformation": "remove_private_keys",
            }),
            scalar => json!({
                "operation": "transform",
                "transformed_data": scalar,
                "transformation": "none",
            }),
        },
    };
    if let (Value::Object(out), Value::Object(extra)) = (&mut result, extra) {
        out.extend(extra);
    }
    Ok(result)
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReportType {
    Summary,
    Detailed,
    Insights,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReportFormat {
    Json,
    Markdown,
    Text,
}

#[derive(Debug, Deserialize)]
struct ReportArgs {
    data: Map<String, Value>,
    report_type: ReportType,
    format: ReportFormat,
}

fn object<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    data.get(key).and_then(Value::as_object)
}

fn missing_pct(info: &Value) -> f64 {
    info.get("percentage").and_then(Value::as_f64).unwrap_or(0.0)
}

fn summary_report(data: &Map<String, Value>, generated_at: &str) -> Value {
    let mut overview = Map::new();
    if let Some(rows) = data.get("total_rows") {
        overview.insert("total_records".into(), rows.clone());
    }
    if let Some(cols) = data.get("total_columns") {
        overview.insert("total_fields".into(), cols.clone());
    }

    let mut findings = Vec::new();
    let mut recommendations = Vec::new();
    if let Some(missing) = object(data, "missing_values") {
        let high: Map<String, Value> = missing
            .iter()
            .filter(|(_, v)| missing_pct(v) > 20.0)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !high.is_empty() {
            findings.push(json!({
                "type": "data_quality",
                "finding": "High missing values detected",
                "details": high,
            }));
        }
        let affected: Vec<&String> = missing
            .iter()
            .filter(|(_, v)| missing_pct(v) > 10.0)
            .map(|(k, _)| k)
            .collect();
        if !affected.is_empty() {
            recommendations.push(json!({
                "type": "data_cleaning",
                "action": "Address missing values",
                "affected_fields": affected,
            }));
        }
    }
    if let Some(stats) = object(data, "numeric_statistics") {
        for (column, s) in stats {
            let mean = s.get("mean").and_then(Value::as_f64);
            let std = s.get("std").and_then(Value::as_f64);
            if let (Some(mean), Some(std)) = (mean, std) {
                if std > mean && mean != 0.0 {
                    findings.push(json!({
                        "type": "statistical",
                        "finding": format!("High variability in {column}"),
                        "details": {
                            "mean": mean,
                            "std": std,
                            "coefficient_of_variation": std / mean,
                        },
                    }));
                }
            }
        }
    }

    json!({
        "report_type": "summary",
        "generated_at": generated_at,
        "overview": overview,
        "key_findings": findings,
        "recommendations": recommendations,
    })
}

fn detailed_report(data: &Map<String, Value>, generated_at: &str) -> Value {
    let (quality, fields) = match object(data, "missing_values").filter(|m| !m.is_empty()) {
        None => (100.0, Map::new()),
        Some(missing) => {
            let avg = missing.values().map(missing_pct).sum::<f64>() / missing.len() as f64;
            let score = ((100.0 - avg).max(0.0) * 100.0).round() / 100.0;
            let fields = missing
                .iter()
                .map(|(k, v)| {
                    let count = v.get("count").cloned().unwrap_or(Value::Null);
                    (k.clone(), json!({"completeness": 100.0 - missing_pct(v), "missing_count": count}))
                })
                .collect();
            (score, fields)
        }
    };
    json!({
        "report_type": "detailed",
        "generated_at": generated_at,
        "full_analysis": data,
        "data_quality_score": quality,
        "field_analysis": fields,
    })
}

fn insights_report(data: &Map<String, Value>, generated_at: &str) -> Value {
    let mut insights = Vec::new();
    if let Some(stats) = object(data, "numeric_statistics") {
        for (column, s) in stats {
            let min = s.get("min").and_then(Value::as_f64);
            let max = s.get("max").and_then(Value::as_f64);
            if let (Some(min), Some(max)) = (min, max) {
                insights.push(json!({
                    "field": column,
                    "insight": format!("Values range from {min:.2} to {max:.2}"),
                    "type": "range_analysis",
                }));
            }
        }
    }
    if let Some(stats) = object(data, "categorical_statistics") {
        for (column, s) in stats {
            if let Some(unique) = s.get("unique_count") {
                insights.push(json!({
                    "field": column,
                    "insight": format!("Contains {unique} unique values"),
                    "type": "uniqueness_analysis",
                }));
            }
        }
    }
    json!({
        "report_type": "insights",
        "generated_at": generated_at,
        "insights": insights,
    })
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

fn text_or_na(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "N/A".to_string(),
        Some(other) => other.to_string(),
    }
}

fn markdown(report: &Value) -> String {
    let field = |key: &str| report.get(key);
    let mut lines = vec![
        format!(
            "# Data Report - {}",
            title_case(field("report_type").and_then(Value::as_str).unwrap_or("unknown"))
        ),
        format!("Generated at: {}", text_or_na(field("generated_at"))),
        String::new(),
    ];

    if let Some(overview) = field("overview") {
        lines.push("## Overview".into());
        lines.push(format!("- Total Records: {}", text_or_na(overview.get("total_records"))));
        lines.push(format!("- Total Fields: {}", text_or_na(overview.get("total_fields"))));
        lines.push(String::new());
    }
    if let Some(score) = field("data_quality_score") {
        lines.push("## Data Quality".into());
        lines.push(format!("- Score: {score}"));
        lines.push(String::new());
    }

    let sections = [
        ("key_findings", "Key Findings", "type", "finding"),
        ("recommendations", "Recommendations", "type", "action"),
        ("insights", "Insights", "field", "insight"),
    ];
    for (key, heading, label, text) in sections {
        let Some(items) = field(key).and_then(Value::as_array) else {
            continue;
        };
        lines.push(format!("## {heading}"));
        lines.push(String::new());
        for item in items {
            lines.push(format!(
                "- **{}**: {}",
                text_or_na(item.get(label)),
                text_or_na(item.get(text))
            ));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

fn plain_text(value: &Value, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if v.is_object() || v.is_array() {
                    out.push_str(&format!("{pad}{k}:\n"));
                    plain_text(v, indent + 1, out);
                } else {
                    out.push_str(&format!("{pad}{k}: {}\n", text_or_na(Some(v))));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if item.is_object() || item.is_array() {
                    out.push_str(&format!("{pad}-\n"));
                    plain_text(item, indent + 1, out);
                } else {
                    out.push_str(&format!("{pad}- {}\n", text_or_na(Some(item))));
                }
            }
        }
        scalar => out.push_str(&format!("{pad}{}\n", text_or_na(Some(scalar)))),
    }
}

async fn generate_report(args: ValidatedArguments, _ctx: CallContext) -> Result<Value, HandlerError> {
    let ReportArgs {
        data,
        report_type,
        format,
    } = args.parse()?;
    if data.is_empty() {
        return Err(HandlerError::invalid_input("data cannot be empty"));
    }

    let generated_at = Utc::now().to_rfc3339();
    let (type_name, report) = match report_type {
        ReportType::Summary => ("summary", summary_report(&data, &generated_at)),
        ReportType::Detailed => ("detailed", detailed_report(&data, &generated_at)),
        ReportType::Insights => ("insights", insights_report(&data, &generated_at)),
    };
    let (format_name, formatted) = match format {
        ReportFormat::Json => ("json", serde_json::to_string_pretty(&report)?),
        ReportFormat::Markdown => ("markdown", markdown(&report)),
        ReportFormat::Text => {
            let mut out = String::new();
            plain_text(&report, 0, &mut out);
            ("text", out)
        }
    };

    Ok(json!({
        "report_type": type_name,
        "format": format_name,
        "report_data": report,
        "formatted_output": formatted,
        "generation_timestamp": generated_at,
    }))
}

// =============================================================================
// Registration
// =============================================================================

pub fn register(registry: &mut ToolRegistry, sandbox: &SandboxConfig) -> Result<(), RegistryError> {
    let max_bytes = sandbox.max_file_bytes;

    registry.register(
        ToolDescriptor::new(
            "analyze_csv",
            "Analyze a CSV file and return statistics",
            Schema::object()
                .required("file_path", Schema::string().describe("Path to the CSV file to analyze"))
                .optional(
                    "delimiter",
                    Schema::string()
                        .describe("CSV delimiter character")
                        .default_value(json!(",")),
                )
                .optional(
                    "max_rows",
                    Schema::integer()
                        .describe("Maximum number of rows to analyze")
                        .min(1.0)
                        .max(10_000.0)
                        .default_value(json!(1000)),
                ),
        )
        .side_effect(SideEffectClass::FilesystemRead)
        .path_field("file_path", AccessMode::Read, PathKind::File),
        move |args: ValidatedArguments, ctx: CallContext| analyze_csv(args, ctx, max_bytes),
    )?;

    registry.register(
        ToolDescriptor::new(
            "process_json",
            "Process and analyze a JSON file",
            Schema::object()
                .required("file_path", Schema::string().describe("Path to the JSON file to process"))
                .optional(
                    "operation",
                    Schema::enumeration(["analyze", "extract", "transform"])
                        .describe("Operation to perform")
                        .default_value(json!("analyze")),
                )
                .optional(
                    "json_path",
                    Schema::string().describe("Dotted path for extraction (e.g., 'users.0.name')"),
                ),
        )
        .side_effect(SideEffectClass::FilesystemRead)
        .path_field("file_path", AccessMode::Read, PathKind::File),
        move |args: ValidatedArguments, ctx: CallContext| process_json(args, ctx, max_bytes),
    )?;

    registry.register(
        ToolDescriptor::new(
            "generate_report",
            "Generate a data report from analysis results",
            Schema::object()
                .required("data", Schema::object().describe("Data to generate report from"))
                .optional(
                    "report_type",
                    Schema::enumeration(["summary", "detailed", "insights"])
                        .describe("Type of report to generate")
                        .default_value(json!("summary")),
                )
                .optional(
                    "format",
                    Schema::enumeration(["json", "markdown", "text"])
                        .describe("Output format")
                        .default_value(json!("json")),
                ),
        ),
        generate_report,
    )?;
    Ok(())
}
