use actix_web::{error::InternalError, HttpResponse};
use serde::Serialize;
use serde_json::{json, Map, Value};
use validator::ValidationErrors;

/// Error body shared by every non-2xx JSON response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

fn bad_request(error: &str, fields: Value) -> actix_web::Error {
    InternalError::from_response(
        "",
        HttpResponse::BadRequest().json(ErrorResponse {
            error: error.to_string(),
            fields,
        }),
    )
    .into()
}

/// `{field: {errors: [...]}}` for every failed field
fn field_messages(errors: &ValidationErrors) -> Value {
    let fields: Map<String, Value> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field))
                })
                .collect();
            (field.to_string(), json!({ "errors": messages }))
        })
        .collect();
    Value::Object(fields)
}

/// Turn a body deserialization failure into a client-facing hint
fn deserialize_hint(message: &str) -> &'static str {
    if message.contains("EOF while parsing") {
        "Request body is empty. Expected JSON payload"
    } else if message.contains("missing field") {
        "Missing required field. 'text' is required"
    } else if message.contains("invalid type") {
        "Invalid field type. Check 'duration' is a number and the rest are strings"
    } else {
        "Invalid JSON format"
    }
}

/// JsonConfig used for every JSON body: validation failures become 400s
/// carrying the per-field messages
pub fn json_config() -> actix_web_validator::JsonConfig {
    actix_web_validator::JsonConfig::default().error_handler(|err, _req| match err {
        actix_web_validator::Error::Validate(errors) => bad_request("Validation failed", field_messages(&errors)),
        actix_web_validator::Error::Deserialize(de_err) => bad_request(
            "Request validation failed",
            json!({ "message": deserialize_hint(&de_err.to_string()) }),
        ),
        other => bad_request(
            "Request validation failed",
            json!({ "message": deserialize_hint(&other.to_string()) }),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_cover_common_body_mistakes() {
        assert_eq!(
            deserialize_hint("EOF while parsing a value at line 1 column 0"),
            "Request body is empty. Expected JSON payload"
        );
        assert!(deserialize_hint("missing field `text`").contains("'text'"));
        assert_eq!(deserialize_hint("expected value"), "Invalid JSON format");
    }
}
