use anyhow::{anyhow, Result};
use rusqlite::ErrorCode;
use serde_json::{Map, Value};

/// Whether the error chain holds a SQLite busy/locked failure, i.e. another
/// writer held the database and the transaction can be re-run.
pub fn is_conflict(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(failure, _))
                if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    })
}

/// Add `delta` to the numeric field at a dotted path (`emotionSums.happy`),
/// creating missing objects and treating a missing field as zero.
/// Integer fields stay integers when the delta is whole.
pub fn apply_increment(doc: &mut Value, field: &str, delta: f64) -> Result<()> {
    if !delta.is_finite() {
        return Err(anyhow!("increment of '{field}' by non-finite {delta}"));
    }

    let mut segments = field.split('.').peekable();
    let mut cursor = doc;
    while let Some(segment) = segments.next() {
        if !cursor.is_object() {
            if cursor.is_null() {
                *cursor = Value::Object(Map::new());
            } else {
                return Err(anyhow!("cannot increment '{field}': parent is not an object"));
            }
        }
        let object = cursor
            .as_object_mut()
            .ok_or_else(|| anyhow!("cannot increment '{field}': parent is not an object"))?;

        if segments.peek().is_none() {
            let current = object.entry(segment.to_string()).or_insert(Value::from(0));
            *current = add_number(current, delta)
                .ok_or_else(|| anyhow!("cannot increment '{field}': not a number"))?;
            return Ok(());
        }

        cursor = object.entry(segment.to_string()).or_insert(Value::Null);
    }

    Err(anyhow!("empty field path"))
}

fn add_number(current: &Value, delta: f64) -> Option<Value> {
    if current.is_null() {
        return add_number(&Value::from(0), delta);
    }
    let Value::Number(number) = current else {
        return None;
    };

    let whole_delta = delta.fract() == 0.0 && delta.abs() < 9_007_199_254_740_992.0;
    if let (Some(existing), true) = (number.as_i64(), whole_delta) {
        if !number.is_f64() {
            return existing.checked_add(delta as i64).map(Value::from);
        }
    }

    let sum = number.as_f64()? + delta;
    serde_json::Number::from_f64(sum).map(Value::Number)
}
