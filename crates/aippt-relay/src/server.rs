//! Actix Web HTTP server.
//!
//! Surface:
//! - `OPTIONS *` -> 204 (CORS preflight)
//! - `GET /` and `GET /health` -> status JSON, never touches the backend
//! - `POST /v1/messages` -> relayed to the configured backend
//! - anything else -> 404 / 405
//!
//! Routing is done by one dispatcher rather than per-resource routes so that
//! preflight and the method check apply to every path, including unknown ones.

use crate::backend::{self, http::credential_from_headers, Backend, BackendResult, RelayRequest};
use crate::body::{check_declared_length, collect_body, parse_chat_request};
use crate::config::{GatewayConfig, MESSAGES_PATH};
use crate::error::RelayError;
use crate::translation::{error_response, into_response};
use crate::types::HealthStatus;
use actix_web::http::header::CONTENT_LENGTH;
use actix_web::http::Method;
use actix_web::middleware::DefaultHeaders;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// CORS headers attached to every response.
pub const CORS_HEADERS: &[(&str, &str)] = &[
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    (
        "Access-Control-Allow-Headers",
        "Content-Type, Authorization, x-api-key, anthropic-version",
    ),
    ("Access-Control-Max-Age", "86400"),
];

pub struct AppState {
    pub config: GatewayConfig,
    pub backend: Arc<dyn Backend>,
}

impl AppState {
    pub fn new(config: GatewayConfig, backend: Arc<dyn Backend>) -> Self {
        Self { config, backend }
    }

    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let backend = backend::from_config(&config)?;
        Ok(Self::new(config, backend))
    }

    fn accepts_path(&self, path: &str) -> bool {
        self.config.accept_any_path || path.trim_end_matches('/').ends_with(MESSAGES_PATH)
    }
}

pub fn cors_headers() -> DefaultHeaders {
    CORS_HEADERS
        .iter()
        .fold(DefaultHeaders::new(), |headers, &(name, value)| {
            headers.add((name, value))
        })
}

/// Register the relay's routes. Pair with [`cors_headers`] and an
/// `app_data(web::Data<AppState>)`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::to(dispatch));
}

pub async fn serve(config: GatewayConfig) -> Result<()> {
    let addr = config.bind_addr();
    let workers = config.workers;
    let state = web::Data::new(AppState::from_config(config)?);

    info!(
        addr = %addr,
        backend = %state.backend.kind(),
        target = state.backend.target().as_deref().unwrap_or("-"),
        api_key = if state.config.has_api_key() { "configured" } else { "not set" },
        "aippt-relay listening"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors_headers())
            .configure(configure)
    })
    .workers(workers)
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    info!("aippt-relay stopped");
    Ok(())
}

async fn dispatch(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Payload,
) -> HttpResponse {
    let method = req.method();
    let path = req.path();

    if method == Method::OPTIONS {
        return HttpResponse::NoContent().finish();
    }
    if method == Method::GET && matches!(path, "/" | "/health") {
        return health(&state);
    }

    info!(%method, %path, "request");

    if method != Method::POST {
        return error_response(&RelayError::MethodNotSupported);
    }
    if !state.accepts_path(path) {
        return error_response(&RelayError::NotFound);
    }

    handle_messages(&state, &req, payload).await
}

fn health(state: &AppState) -> HttpResponse {
    HttpResponse::Ok().json(HealthStatus {
        status: "ok",
        mode: state.backend.kind().as_str(),
        has_api_key: state.config.has_api_key(),
        target: state.backend.target(),
    })
}

async fn read_request(
    state: &AppState,
    req: &HttpRequest,
    payload: web::Payload,
) -> Result<RelayRequest, RelayError> {
    let limit = state.config.max_body_bytes;
    check_declared_length(
        req.headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok()),
        limit,
    )?;

    let raw_body = collect_body(payload, limit).await?;
    let chat = parse_chat_request(&raw_body)?;

    Ok(RelayRequest {
        chat,
        raw_body,
        credential: credential_from_headers(req.headers()),
    })
}

async fn handle_messages(
    state: &AppState,
    req: &HttpRequest,
    payload: web::Payload,
) -> HttpResponse {
    let request = match read_request(state, req, payload).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "rejected request");
            return error_response(&e);
        }
    };

    debug!(
        model = request.chat.model.as_deref().unwrap_or("-"),
        messages = request.chat.messages.len(),
        max_tokens = ?request.chat.max_tokens,
        "relaying"
    );

    let result = state.backend.complete(&request).await;
    match &result {
        BackendResult::Success { text, stop_reason, .. } => {
            info!(%stop_reason, chars = text.chars().count(), "completion ok");
        }
        BackendResult::Passthrough { status, .. } => {
            info!(status, "upstream response relayed");
        }
        BackendResult::Failure(e) => {
            error!(error = %e, status = e.status_code().as_u16(), "backend failed");
        }
    }

    into_response(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the first message back and counts calls.
    #[derive(Default)]
    struct EchoBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Backend for EchoBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Subprocess
        }

        async fn complete(&self, request: &RelayRequest) -> BackendResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            BackendResult::Success {
                text: request.chat.messages[0].content.to_plaintext(),
                stop_reason: "end_turn".to_string(),
                model: request.chat.model.clone(),
            }
        }
    }

    fn state(config: GatewayConfig, backend: Arc<EchoBackend>) -> web::Data<AppState> {
        web::Data::new(AppState::new(config, backend))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state)
                    .wrap(cors_headers())
                    .configure(configure),
            )
            .await
        };
    }

    const HI: &str = r#"{"model":"x","messages":[{"role":"user","content":"hi"}]}"#;

    #[actix_web::test]
    async fn test_preflight_on_any_path() {
        let backend = Arc::new(EchoBackend::default());
        let app = app!(state(GatewayConfig::default(), backend.clone()));

        for uri in ["/v1/messages", "/nowhere", "/health"] {
            let req = test::TestRequest::default()
                .method(Method::OPTIONS)
                .uri(uri)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NO_CONTENT, "{uri}");
            for (name, value) in CORS_HEADERS {
                assert_eq!(resp.headers().get(*name).unwrap(), *value, "{uri} {name}");
            }
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn test_health_on_root_and_health() {
        let backend = Arc::new(EchoBackend::default());
        let config = GatewayConfig {
            api_key: Some("k".to_string()),
            ..GatewayConfig::default()
        };
        let app = app!(state(config, backend.clone()));

        for uri in ["/", "/health"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["status"], "ok");
            assert_eq!(body["hasApiKey"], true);
            assert_eq!(body["mode"], "subprocess");
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn test_non_post_is_405_with_cors() {
        let app = app!(state(GatewayConfig::default(), Arc::default()));

        let req = test::TestRequest::get().uri("/v1/messages").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": "Method not allowed"}));
    }

    #[actix_web::test]
    async fn test_post_path_strictness() {
        let app = app!(state(GatewayConfig::default(), Arc::default()));
        let req = test::TestRequest::post()
            .uri("/v2/other")
            .set_payload(HI)
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );

        let req = test::TestRequest::post()
            .uri("/api/v1/messages")
            .set_payload(HI)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let lenient = GatewayConfig {
            accept_any_path: true,
            ..GatewayConfig::default()
        };
        let app = app!(state(lenient, Arc::default()));
        let req = test::TestRequest::post()
            .uri("/anything")
            .set_payload(HI)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_relays_to_backend() {
        let backend = Arc::new(EchoBackend::default());
        let app = app!(state(GatewayConfig::default(), backend.clone()));

        let req = test::TestRequest::post()
            .uri("/v1/messages")
            .set_payload(HI)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            json!({"content": [{"type": "text", "text": "hi"}], "stop_reason": "end_turn", "model": "x"})
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_malformed_body_is_400_without_backend_call() {
        let backend = Arc::new(EchoBackend::default());
        let app = app!(state(GatewayConfig::default(), backend.clone()));

        for payload in ["{not json", r#"{"messages":[]}"#, r#"{"model":"x"}"#] {
            let req = test::TestRequest::post()
                .uri("/v1/messages")
                .set_payload(payload)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{payload}");
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn test_oversized_body_is_413_without_backend_call() {
        let backend = Arc::new(EchoBackend::default());
        let config = GatewayConfig {
            max_body_bytes: 16,
            ..GatewayConfig::default()
        };
        let app = app!(state(config, backend.clone()));

        let req = test::TestRequest::post()
            .uri("/v1/messages")
            .set_payload(HI)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
