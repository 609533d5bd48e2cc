//! Classification of a combined response into one of three shapes.

use serde_json::Value;

use crate::transport::{ContentKind, TransportResponse};

/// Shape of a combined response, decided once before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// A JSON array with one entry per request.
    Sequence(Vec<Value>),
    /// A JSON document that is not an array; describes a whole-call failure.
    SingleError(Value),
    /// A body that was not declared as JSON, or did not parse as JSON.
    OpaqueText(String),
}

impl ResponseShape {
    pub fn classify(response: &TransportResponse) -> Self {
        match response.content_kind {
            ContentKind::Structured => match serde_json::from_slice::<Value>(&response.body) {
                Ok(Value::Array(items)) => ResponseShape::Sequence(items),
                Ok(other) => ResponseShape::SingleError(other),
                Err(_) => ResponseShape::OpaqueText(lossy_text(&response.body)),
            },
            ContentKind::Opaque => ResponseShape::OpaqueText(lossy_text(&response.body)),
        }
    }
}

fn lossy_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_array_is_sequence() {
        let response = TransportResponse::structured(200, &json!([{ "data": 1 }, { "data": 2 }]));

        assert_eq!(
            ResponseShape::classify(&response),
            ResponseShape::Sequence(vec![json!({ "data": 1 }), json!({ "data": 2 })])
        );
    }

    #[test]
    fn test_json_object_is_single_error() {
        let response = TransportResponse::structured(400, &json!({ "message": "bad" }));

        assert_eq!(
            ResponseShape::classify(&response),
            ResponseShape::SingleError(json!({ "message": "bad" }))
        );
    }

    #[test]
    fn test_undeclared_json_stays_opaque() {
        let response = TransportResponse::opaque(200, r#"[{"data":1}]"#);

        assert_eq!(
            ResponseShape::classify(&response),
            ResponseShape::OpaqueText(r#"[{"data":1}]"#.to_string())
        );
    }

    #[test]
    fn test_malformed_json_is_opaque() {
        let response = TransportResponse::new(502, ContentKind::Structured, "<html>bad gateway</html>");

        assert_eq!(
            ResponseShape::classify(&response),
            ResponseShape::OpaqueText("<html>bad gateway</html>".to_string())
        );
    }
}
