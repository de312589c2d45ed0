use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::warn;

/// Result shape of one query. Exactly one row with one column is a scalar;
/// anything else is a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Table,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Scalar => "scalar",
            Shape::Table => "table",
        }
    }
}

/// One saved read query: `queries/q*.sql`, immutable after startup.
/// Header comments carry the display label and the declared shape.
#[derive(Debug, Clone)]
pub struct QueryDef {
    pub id: String,
    pub label: String,
    pub declared_shape: Option<Shape>,
    pub sql: String,
}

/// Load every q*.sql under `dir`, in file-name order.
pub fn load_dir(dir: &Path) -> Result<Vec<QueryDef>> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("failed to read query dir {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with('q') && name.ends_with(".sql"))
        .collect();
    names.sort();

    let mut defs = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(&name);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let id = name.trim_end_matches(".sql").to_string();
        let (label, declared_shape) = parse_header(&text);
        defs.push(QueryDef {
            label: label.unwrap_or_else(|| id.clone()),
            id,
            declared_shape,
            sql: text,
        });
    }
    Ok(defs)
}

/// Read `-- label:` / `-- shape:` from the leading comment block.
fn parse_header(text: &str) -> (Option<String>, Option<Shape>) {
    let mut label = None;
    let mut shape = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some(comment) = trimmed.strip_prefix("--") else {
            break;
        };
        let comment = comment.trim();
        if let Some(value) = comment.strip_prefix("label:") {
            label = Some(value.trim().to_string());
        } else if let Some(value) = comment.strip_prefix("shape:") {
            shape = match value.trim() {
                "scalar" => Some(Shape::Scalar),
                "table" => Some(Shape::Table),
                _ => None,
            };
        }
    }
    (label, shape)
}

/// An executed query result, already classified.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Scalar(serde_json::Value),
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
}

impl QueryValue {
    pub fn shape(&self) -> Shape {
        match self {
            QueryValue::Scalar(_) => Shape::Scalar,
            QueryValue::Table { .. } => Shape::Table,
        }
    }
}

/// Execute one definition, preserving column and row order as returned by
/// the store. Numeric formatting (e.g. two-decimal percentages) is the
/// query's own business; values pass through untouched.
pub fn run_query(conn: &Connection, def: &QueryDef) -> Result<QueryValue> {
    let mut stmt = conn
        .prepare(&def.sql)
        .with_context(|| format!("query {} failed to prepare", def.id))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt
        .query([])
        .with_context(|| format!("query {} failed to execute", def.id))?;
    let mut data: Vec<Vec<serde_json::Value>> = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(json_value(row.get_ref(i)?));
        }
        data.push(values);
    }

    if data.len() == 1 && columns.len() == 1 {
        return Ok(QueryValue::Scalar(data.remove(0).remove(0)));
    }
    Ok(QueryValue::Table { columns, rows: data })
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => serde_json::Value::Null,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryStatus {
    Succeeded,
    Failed(String),
}

pub struct QueryRun {
    pub id: String,
    pub label: String,
    pub status: QueryStatus,
    pub value: Option<QueryValue>,
}

/// Run the whole battery. A query that raises aborts only its own card;
/// the rest still execute, and every query gets a status entry.
pub fn run_all(conn: &Connection, defs: &[QueryDef]) -> Vec<QueryRun> {
    defs.iter()
        .map(|def| match run_query(conn, def) {
            Ok(value) => {
                if let Some(declared) = def.declared_shape {
                    if declared != value.shape() {
                        warn!(
                            "query {} declared {} but returned {}",
                            def.id,
                            declared.as_str(),
                            value.shape().as_str()
                        );
                    }
                }
                QueryRun {
                    id: def.id.clone(),
                    label: def.label.clone(),
                    status: QueryStatus::Succeeded,
                    value: Some(value),
                }
            }
            Err(e) => {
                warn!("query {} failed: {e:#}", def.id);
                QueryRun {
                    id: def.id.clone(),
                    label: def.label.clone(),
                    status: QueryStatus::Failed(format!("{e:#}")),
                    value: None,
                }
            }
        })
        .collect()
}

// ── Tests ──
