//! Backend result -> HTTP response.
//!
//! Every response built here sets `Access-Control-Allow-Origin` itself, even
//! though the server also attaches the CORS set to all responses, so the
//! header is present on every path.

use crate::backend::BackendResult;
use crate::error::RelayError;
use crate::types::{CompletionEnvelope, TextBlock};
use actix_web::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder};

fn json_response(status: StatusCode) -> HttpResponseBuilder {
    let mut builder = HttpResponse::build(status);
    builder
        .insert_header((ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((CONTENT_TYPE, "application/json"));
    builder
}

pub fn into_response(result: BackendResult) -> HttpResponse {
    match result {
        BackendResult::Success {
            text,
            stop_reason,
            model,
        } => json_response(StatusCode::OK).json(CompletionEnvelope {
            content: vec![TextBlock::new(text)],
            stop_reason,
            model,
        }),
        BackendResult::Passthrough { status, body } => {
            json_response(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)).body(body)
        }
        BackendResult::Failure(err) => error_response(&err),
    }
}

pub fn error_response(err: &RelayError) -> HttpResponse {
    json_response(err.status_code()).json(err.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::web::Bytes;
    use serde_json::{json, Value};

    async fn body_json(resp: HttpResponse) -> Value {
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn test_success_envelope() {
        let resp = into_response(BackendResult::Success {
            text: "hello".to_string(),
            stop_reason: "end_turn".to_string(),
            model: Some("x".to_string()),
        });
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(
            body_json(resp).await,
            json!({"content": [{"type": "text", "text": "hello"}], "stop_reason": "end_turn", "model": "x"})
        );
    }

    #[actix_web::test]
    async fn test_passthrough_is_verbatim() {
        let resp = into_response(BackendResult::Passthrough {
            status: 529,
            body: Bytes::from_static(b"{\"type\":\"error\"}"),
        });
        assert_eq!(resp.status().as_u16(), 529);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"{\"type\":\"error\"}");
    }

    #[actix_web::test]
    async fn test_failure_envelope() {
        let resp = into_response(BackendResult::Failure(RelayError::BackendRejected {
            status: None,
            message: "boom".to_string(),
            kind: None,
        }));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(body_json(resp).await, json!({"error": {"message": "boom"}}));
    }
}
