use serde_json::{Map, Value};
use thiserror::Error;

/// One spreadsheet row: column name to cell value, in insertion order.
pub type FlatRow = Map<String, Value>;

pub const ALLIANCES: [&str; 2] = ["red", "blue"];

const TEAM_KEY_PREFIX: &str = "frc";
const TEAM_SLOTS: [&str; 3] = ["bot1", "bot2", "bot3"];

/// Match-level bookkeeping fields that never reach a row.
pub const IGNORE_TOP_KEYS: [&str; 9] = [
    "actual_time",
    "comp_level",
    "match_number",
    "key",
    "post_result_time",
    "predicted_time",
    "set_number",
    "time",
    "videos",
];

/// Nested structured-scoring objects whose children are lifted to the top level.
pub const REEF_KEYS: [&str; 2] = ["autoReef", "teleopReef"];

/// Row-position indicators inside the reef objects.
pub const IGNORE_REEF_KEYS: [&str; 3] = ["botRow", "midRow", "topRow"];

const TOTAL_POINTS: &str = "totalPoints";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    #[error("match record is {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("`{field}` is {found}, expected an object")]
    UnexpectedShape {
        field: String,
        found: &'static str,
    },
}

/// Flatten one raw match into a row per alliance (red first, then blue).
///
/// Matches without `alliances` or `score_breakdown` are unplayed or incomplete
/// and produce no rows. Field-level problems (odd team keys, missing scores)
/// degrade to nulls; only structural surprises are reported as errors.
pub fn flatten_match(raw: &Value) -> Result<Vec<FlatRow>, FlattenError> {
    let Some(record) = raw.as_object() else {
        return Err(FlattenError::NotAnObject(json_kind(raw)));
    };

    let (Some(alliances), Some(breakdown)) = (
        present(record.get("alliances")),
        present(record.get("score_breakdown")),
    ) else {
        return Ok(Vec::new());
    };
    let alliances = expect_object("alliances", alliances)?;
    let breakdown = expect_object("score_breakdown", breakdown)?;

    let mut common = FlatRow::new();
    for (key, value) in record {
        if IGNORE_TOP_KEYS.contains(&key.as_str()) || key == "alliances" || key == "score_breakdown"
        {
            continue;
        }
        common.insert(key.clone(), value.clone());
    }
    common.insert(
        "match".to_string(),
        Value::String(match_label(record.get("comp_level"), record.get("match_number"))),
    );

    let mut rows = Vec::with_capacity(ALLIANCES.len());
    for color in ALLIANCES {
        let mut row = common.clone();
        row.insert("alliance".to_string(), Value::String(color.to_string()));

        let side = side_object(alliances, "alliances", color)?;
        let team_keys = side
            .and_then(|s| s.get("team_keys"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for (slot, column) in TEAM_SLOTS.iter().enumerate() {
            let number = team_keys.get(slot).and_then(team_number);
            row.insert(column.to_string(), number.map(Value::from).unwrap_or(Value::Null));
        }

        let score = side
            .and_then(|s| s.get("score"))
            .cloned()
            .unwrap_or(Value::Null);
        row.insert("alliance_score".to_string(), score);

        if let Some(side_breakdown) = side_object(breakdown, "score_breakdown", color)? {
            row.extend(flatten_score_breakdown(side_breakdown));
        }

        rows.push(row);
    }

    Ok(rows)
}

/// Flatten one alliance's score breakdown.
///
/// `totalPoints` is dropped (the row already carries `alliance_score`), the
/// reef objects are lifted one level as `<parent>_<child>` minus the row
/// position keys, and everything else is copied unchanged.
pub fn flatten_score_breakdown(breakdown: &Map<String, Value>) -> FlatRow {
    let mut flat = FlatRow::new();
    for (key, value) in breakdown {
        if key == TOTAL_POINTS {
            continue;
        }
        match value {
            Value::Object(nested) if REEF_KEYS.contains(&key.as_str()) => {
                for (sub_key, sub_value) in nested {
                    if IGNORE_REEF_KEYS.contains(&sub_key.as_str()) {
                        continue;
                    }
                    flat.insert(format!("{key}_{sub_key}"), sub_value.clone());
                }
            }
            _ => {
                flat.insert(key.clone(), value.clone());
            }
        }
    }
    flat
}

/// Team number from a key such as `frc1678`. Anything else yields `None`.
pub fn team_number(team_key: &Value) -> Option<i64> {
    let raw = team_key.as_str()?;
    raw.replace(TEAM_KEY_PREFIX, "").trim().parse::<i64>().ok()
}

/// Human match identifier, e.g. `qm 12` or `sf 3`.
pub fn match_label(comp_level: Option<&Value>, match_number: Option<&Value>) -> String {
    format!("{} {}", label_part(comp_level), label_part(match_number))
}

fn label_part(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn expect_object<'a>(field: &str, value: &'a Value) -> Result<&'a Map<String, Value>, FlattenError> {
    value.as_object().ok_or_else(|| FlattenError::UnexpectedShape {
        field: field.to_string(),
        found: json_kind(value),
    })
}

fn side_object<'a>(
    parent: &'a Map<String, Value>,
    parent_name: &str,
    color: &str,
) -> Result<Option<&'a Map<String, Value>>, FlattenError> {
    match present(parent.get(color)) {
        None => Ok(None),
        Some(value) => expect_object(&format!("{parent_name}.{color}"), value).map(Some),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
