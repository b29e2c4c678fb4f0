use serde_json::Value;

/// Result of a finished egress, extracted from a webhook body.
#[derive(Debug, Clone, PartialEq)]
pub struct EgressOutcome {
    pub egress_id: String,
    pub complete: bool,
    pub location: Option<String>,
    pub size_bytes: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// Protobuf JSON renders int64 as strings; accept either form.
fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field<'a>(obj: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake))
}

/// Returns the outcome of an `egress_ended` event, `None` for other events.
pub fn egress_outcome(body: &Value) -> Option<EgressOutcome> {
    if body.get("event").and_then(Value::as_str) != Some("egress_ended") {
        return None;
    }
    let info = field(body, "egressInfo", "egress_info")?;
    let egress_id = field(info, "egressId", "egress_id")?.as_str()?.to_string();
    let complete = info.get("status").and_then(Value::as_str) == Some("EGRESS_COMPLETE");

    let file = field(info, "fileResults", "file_results")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
        .or_else(|| info.get("file"));

    let (location, size_bytes, duration_ms) = match file {
        Some(f) => (
            f.get("location")
                .or_else(|| f.get("filename"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            f.get("size").and_then(as_i64),
            // nanoseconds on the wire
            f.get("duration").and_then(as_i64).map(|ns| ns / 1_000_000),
        ),
        None => (None, None, None),
    };

    Some(EgressOutcome {
        egress_id,
        complete,
        location,
        size_bytes,
        duration_ms,
    })
}
