use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// One response line. `id` is absent only when the request line itself could
/// not be parsed.
#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody<'a>>,
}

fn render(envelope: Envelope<'_>) -> serde_json::Value {
    serde_json::to_value(envelope).unwrap_or_else(|_| json!({ "ok": false }))
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    render(Envelope {
        id: Some(id),
        ok: true,
        result: Some(result),
        error: None,
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    render(Envelope {
        id: Some(id),
        ok: false,
        result: None,
        error: Some(ErrorBody {
            code,
            message: message.into(),
            details,
        }),
    })
}

pub fn bad_json(message: impl Into<String>) -> serde_json::Value {
    render(Envelope {
        id: None,
        ok: false,
        result: None,
        error: Some(ErrorBody {
            code: "bad_json",
            message: message.into(),
            details: None,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_omit_empty_fields() {
        assert_eq!(
            ok("7", json!({ "grade": "A" })),
            json!({ "id": "7", "ok": true, "result": { "grade": "A" } })
        );
        assert_eq!(
            err("8", "not_found", "student not found", None),
            json!({ "id": "8", "ok": false, "error": { "code": "not_found", "message": "student not found" } })
        );
        let bad = bad_json("expected value");
        assert!(bad.get("id").is_none());
        assert_eq!(bad["error"]["code"], "bad_json");
    }
}
