//! Structural checks on a fetched document before anything touches the store.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::source::DatasetKind;

/// Invalid keys listed in the report are capped; the count stays exact.
const MAX_REPORTED_INVALID: usize = 50;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub kind: Option<DatasetKind>,
    /// False only when the document is not a mapping or has no entries.
    pub acceptable: bool,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub invalid_keys: Vec<String>,
}

/// Valid `(class_name, record)` pairs plus the counters.
#[derive(Debug, Clone, Default)]
pub struct ValidatedDataset {
    pub report: ValidationReport,
    pub entries: Vec<(String, Value)>,
}

/// Check the document shape and each entry's minimal contract. Never fails:
/// bad entries are counted and dropped, good ones carry on.
pub fn validate_dataset(kind: DatasetKind, document: &Value) -> ValidatedDataset {
    let mut out = ValidatedDataset {
        report: ValidationReport {
            kind: Some(kind),
            ..ValidationReport::default()
        },
        entries: Vec::new(),
    };

    let Some(map) = document.as_object() else {
        warn!(kind = %kind, "dataset is not a JSON object; rejecting");
        return out;
    };
    if map.is_empty() {
        warn!(kind = %kind, "dataset is empty; rejecting");
        return out;
    }

    out.report.acceptable = true;
    out.report.total = map.len();
    for (class_name, raw) in map {
        match check_entry(kind, class_name, raw) {
            Ok(record) => {
                out.report.valid += 1;
                out.entries.push((class_name.clone(), record.clone()));
            }
            Err(reason) => {
                debug!(kind = %kind, class_name = %class_name, reason, "invalid entry");
                out.report.invalid += 1;
                if out.report.invalid_keys.len() < MAX_REPORTED_INVALID {
                    out.report.invalid_keys.push(class_name.clone());
                }
            }
        }
    }

    if out.report.invalid > 0 {
        warn!(
            kind = %kind,
            valid = out.report.valid,
            invalid = out.report.invalid,
            "dataset contains invalid entries; they will be skipped"
        );
    }
    out
}

/// Unwrap the one-element array (a bare object is tolerated) and apply the
/// per-kind contract.
fn check_entry<'a>(kind: DatasetKind, class_name: &str, raw: &'a Value) -> Result<&'a Value, &'static str> {
    if class_name.trim().is_empty() {
        return Err("empty class identifier");
    }
    let record = match raw {
        Value::Array(items) => items.first().ok_or("empty record array")?,
        Value::Object(_) => raw,
        _ => return Err("entry is neither an array nor an object"),
    };
    let fields = record.as_object().ok_or("record is not an object")?;
    if !has_name(fields) {
        return Err("missing name");
    }
    if kind == DatasetKind::Recipes {
        for key in ["ingredients", "products", "producedIn"] {
            match fields.get(key) {
                None | Some(Value::Null) | Some(Value::Array(_)) => {}
                Some(_) => return Err("recipe relation field is not a list"),
            }
        }
    }
    Ok(record)
}

fn has_name(fields: &Map<String, Value>) -> bool {
    fields
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty())
}
