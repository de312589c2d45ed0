use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;

use crate::queries::QueryValue;

/// Serialize one query result to `<dir>/<id>.json`, fully replacing any
/// prior card for that id. The write goes to a sibling temp file first and
/// is renamed into place, so a reader never observes a torn card.
pub fn write_card(dir: &Path, id: &str, label: &str, value: &QueryValue) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let generated_at = Utc::now().to_rfc3339();
    let payload = match value {
        QueryValue::Scalar(v) => json!({
            "query": id,
            "label": label,
            "shape": "scalar",
            "value": v,
            "generated_at": generated_at,
        }),
        QueryValue::Table { columns, rows } => json!({
            "query": id,
            "label": label,
            "shape": "table",
            "columns": columns,
            "rows": rows,
            "generated_at": generated_at,
        }),
    };

    let path = dir.join(format!("{id}.json"));
    let tmp = dir.join(format!("{id}.json.tmp"));
    fs::write(&tmp, serde_json::to_vec_pretty(&payload)?)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, &path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(path)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_card_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_card(
            dir.path(),
            "q01",
            "Fall 2025 applicant count",
            &QueryValue::Scalar(json!(42)),
        )
        .unwrap();

        let card: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(card["query"], "q01");
        assert_eq!(card["label"], "Fall 2025 applicant count");
        assert_eq!(card["shape"], "scalar");
        assert_eq!(card["value"], json!(42));
        assert!(card["generated_at"].is_string());
    }

    #[test]
    fn table_card_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let value = QueryValue::Table {
            columns: vec!["university".to_string(), "n".to_string()],
            rows: vec![
                vec![json!("B University"), json!(5)],
                vec![json!("A University"), json!(3)],
            ],
        };
        let path = write_card(dir.path(), "q08", "Top universities", &value).unwrap();

        let card: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(card["columns"], json!(["university", "n"]));
        assert_eq!(card["rows"][0][0], "B University");
        assert_eq!(card["rows"][1][0], "A University");
    }

    #[test]
    fn rewrite_replaces_whole_card() {
        let dir = tempfile::tempdir().unwrap();
        write_card(dir.path(), "q01", "count", &QueryValue::Scalar(json!(1))).unwrap();
        let path = write_card(dir.path(), "q01", "count", &QueryValue::Scalar(json!(2))).unwrap();

        let card: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(card["value"], json!(2));
        // No temp artifact left behind.
        assert!(!dir.path().join("q01.json.tmp").exists());
    }
}
