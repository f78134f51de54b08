use actix_web::body::BoxBody;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(Value),
}

/// Uniform response wrapper.
///
/// Serializes as `{"ok": true, "response": ...}` or
/// `{"ok": false, "error": ...}`; the status travels on the HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    outcome: Outcome<T>,
    status: StatusCode,
}

impl<T> Envelope<T> {
    pub fn success(value: T) -> Self {
        Self {
            outcome: Outcome::Success(value),
            status: StatusCode::OK,
        }
    }

    pub fn failure(error: impl Into<Value>) -> Self {
        Self {
            outcome: Outcome::Failure(error.into()),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn into_outcome(self) -> Outcome<T> {
        self.outcome
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("ok", &self.is_ok())?;
        match &self.outcome {
            Outcome::Success(value) => map.serialize_entry("response", value)?,
            Outcome::Failure(error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}

impl<T: Serialize> Responder for Envelope<T> {
    type Body = BoxBody;

    fn respond_to(self, _req: &HttpRequest) -> HttpResponse<Self::Body> {
        HttpResponse::build(self.status).json(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::test::TestRequest;
    use serde_json::json;

    #[test]
    fn success_shape() {
        let envelope = Envelope::success("ready");
        assert_eq!(envelope.status(), StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"ok": true, "response": "ready"})
        );
    }

    #[test]
    fn failure_defaults_to_bad_request() {
        let envelope: Envelope<()> = Envelope::failure("no-file");
        assert_eq!(envelope.status(), StatusCode::BAD_REQUEST);
        assert!(!envelope.is_ok());
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"ok": false, "error": "no-file"})
        );
    }

    #[test]
    fn structured_failure_with_override() {
        let envelope: Envelope<()> =
            Envelope::failure(json!({"status": "not_ready", "detail": "refused"}))
                .with_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(envelope.status().as_u16(), 503);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap()["error"]["status"],
            "not_ready"
        );
    }

    #[actix_web::test]
    async fn responder_uses_envelope_status() {
        let req = TestRequest::default().to_http_request();
        let response = Envelope::<()>::failure("bad").respond_to(&req);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"ok": false, "error": "bad"}));
    }
}
