//! HTTP and WebSocket surface for the relay.
//!
//! Routes:
//! - `POST /channels` creates a channel and returns its token
//! - `POST /channels/:id/messages` produces one message (always 202)
//! - `GET  /channels/stream` upgrades a consumer after verifying its token
//! - `GET  /health`, `GET /stats`

use crate::domain::channel::ChannelId;
use crate::domain::config::{RelayConfig, WebSocketConfig};
use crate::domain::error::{codes, ApiError, RelayError};
use crate::domain::registry::CloseReason;
use crate::middleware::{auth_rejection, create_cors_layer, extract_token, missing_token, TracingLayer};
use crate::relay::{ChannelRelay, ProduceOutcome};
use crate::ws::ConsumerSession;
use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{debug, info};

/// Inbound consumer frames are ignored, so keep them small.
const CONSUMER_FRAME_LIMIT: usize = 64 * 1024;

/// Relay HTTP service
pub struct RelayService {
    config: RelayConfig,
    relay: Arc<ChannelRelay>,
    extra_routes: Option<Router>,
}

impl RelayService {
    /// Create the service. Fails on invalid configuration.
    pub fn new(config: RelayConfig, relay: Arc<ChannelRelay>) -> Result<Self, RelayError> {
        config.validate()?;
        Ok(Self {
            config,
            relay,
            extra_routes: None,
        })
    }

    /// Mount additional stateless routes (for example `/metrics`).
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.extra_routes = Some(routes);
        self
    }

    pub fn relay(&self) -> Arc<ChannelRelay> {
        Arc::clone(&self.relay)
    }

    /// Build the router with middleware applied.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: Arc::clone(&self.relay),
            websocket: self.config.websocket.clone(),
        };

        let middleware = ServiceBuilder::new()
            .layer(create_cors_layer(&self.config.cors))
            .layer(TracingLayer::new());

        let mut router = Router::new()
            .route("/channels", post(create_channel))
            .route(
                "/channels/:id/messages",
                post(produce).layer(DefaultBodyLimit::max(self.config.http.max_message_size)),
            )
            .route("/channels/stream", get(stream))
            .route("/health", get(health_check))
            .route("/stats", get(stats))
            .with_state(state);

        if let Some(extra) = &self.extra_routes {
            router = router.merge(extra.clone());
        }

        router.layer(middleware)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, RelayError> {
        let addr = self.config.http_addr();
        TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Bind(format!("{}: {}", addr, e)))
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(
            %addr,
            verification = self.relay.policy_name(),
            "Channel relay listening"
        );

        // Upgraded sockets outlive graceful shutdown unless closed here
        let relay = Arc::clone(&self.relay);
        let shutdown = async move {
            shutdown.await;
            relay.close_all(CloseReason::Normal);
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Channel relay stopped");
        Ok(())
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    relay: Arc<ChannelRelay>,
    websocket: WebSocketConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateChannelRequest {
    correlation_id: Option<String>,
}

fn bad_request(code: &'static str, message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(code, message).to_json()),
    )
        .into_response()
}

/// Body is optional; an empty body asks for a generated channel id.
async fn create_channel(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CreateChannelRequest::default()
    } else {
        match serde_json::from_slice::<CreateChannelRequest>(&body) {
            Ok(request) => request,
            Err(e) => return bad_request(codes::INVALID_REQUEST, format!("invalid body: {}", e)),
        }
    };

    let correlation_id = match request.correlation_id.as_deref().map(ChannelId::parse) {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(e)) => return bad_request(codes::INVALID_CHANNEL_ID, e.to_string()),
    };

    let grant = state.relay.create_channel(correlation_id).await;
    let live_tail = grant.token.is_usable();

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "channel_id": grant.channel_id,
            "token": grant.token,
            "live_tail": live_tail,
        })),
    )
        .into_response()
}

async fn produce(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Bytes,
) -> Response {
    let channel_id = match ChannelId::parse(&channel) {
        Ok(id) => id,
        Err(e) => return bad_request(codes::INVALID_CHANNEL_ID, e.to_string()),
    };
    let message = match String::from_utf8(body.to_vec()) {
        Ok(message) => message,
        Err(_) => return bad_request(codes::INVALID_REQUEST, "message must be UTF-8"),
    };

    let body = match state.relay.produce(&channel_id, message) {
        ProduceOutcome::Delivered => serde_json::json!({ "outcome": "delivered" }),
        ProduceOutcome::Buffered => serde_json::json!({ "outcome": "buffered" }),
        ProduceOutcome::Dropped(reason) => {
            serde_json::json!({ "outcome": "dropped", "reason": reason })
        }
    };

    (StatusCode::ACCEPTED, Json(body)).into_response()
}

/// Token is verified before the upgrade so a rejected consumer never sees
/// a byte of backlog.
async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(token) = extract_token(&headers) else {
        return missing_token();
    };

    let channel_id = match state.relay.authorize(token).await {
        Ok(channel_id) => channel_id,
        Err(e) => return auth_rejection(&e),
    };

    let Some(ws) = ws else {
        debug!(channel_id = %channel_id, "Authorized request without WebSocket upgrade");
        return (
            StatusCode::UPGRADE_REQUIRED,
            Json(ApiError::new(codes::INVALID_REQUEST, "WebSocket upgrade required").to_json()),
        )
            .into_response();
    };

    let relay = Arc::clone(&state.relay);
    let ping_interval = state.websocket.ping_interval;
    ws.max_message_size(CONSUMER_FRAME_LIMIT)
        .on_upgrade(move |socket| async move {
            let (session, _) = ConsumerSession::attach(relay, channel_id, ping_interval);
            session.run(socket).await;
        })
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "channel-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticSecret;
    use crate::domain::config::Environment;
    use crate::domain::token::UNAVAILABLE_TOKEN;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn service_with(config: RelayConfig) -> RelayService {
        let secrets = Arc::new(StaticSecret::new(b"service-test-secret-001".to_vec()).unwrap());
        let relay = Arc::new(ChannelRelay::new(&config, secrets));
        RelayService::new(config, relay).unwrap()
    }

    fn service() -> RelayService {
        service_with(RelayConfig::default())
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_req(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(body.into())
            .unwrap()
    }

    fn stream_req(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/channels/stream");
        if let Some(token) = token {
            builder = builder.header("x-relay-token", token);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RelayConfig::default();
        config.token.verification = crate::domain::config::VerificationMode::AlwaysAllow;
        let secrets = Arc::new(StaticSecret::new(b"service-test-secret-001".to_vec()).unwrap());
        let relay = Arc::new(ChannelRelay::new(&config, secrets));
        assert!(matches!(
            RelayService::new(config, relay),
            Err(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_create_channel_generated_id() {
        let response = service()
            .router()
            .oneshot(post_req("/channels", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json(response).await;
        assert_eq!(body["live_tail"], true);
        assert_eq!(body["channel_id"].as_str().unwrap().len(), 36);
        assert!(body["token"].as_str().unwrap().contains('.'));
    }

    #[tokio::test]
    async fn test_create_channel_with_correlation_id() {
        let response = service()
            .router()
            .oneshot(post_req("/channels", r#"{"correlation_id":"build-7"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json(response).await["channel_id"], "build-7");
    }

    #[tokio::test]
    async fn test_create_channel_bad_body() {
        let app = service().router();

        let response = app
            .clone()
            .oneshot(post_req("/channels", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["code"], codes::INVALID_REQUEST);

        let response = app
            .oneshot(post_req("/channels", r#"{"correlation_id":"has space"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["code"], codes::INVALID_CHANNEL_ID);
    }

    #[tokio::test]
    async fn test_create_channel_rejects_url_unsafe_ids() {
        let service = service();
        let app = service.router();

        for raw in ["a/b", "a?b", "a#b", "a%2Fb"] {
            let body = serde_json::json!({ "correlation_id": raw }).to_string();
            let response = app
                .clone()
                .oneshot(post_req("/channels", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{raw}");
            assert_eq!(json(response).await["error"]["code"], codes::INVALID_CHANNEL_ID);
        }

        // An escaped slash decodes to an id no channel can have
        let response = app
            .oneshot(post_req("/channels/a%2Fb/messages", "x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(service.relay().stats().channels_created, 0);
    }

    #[tokio::test]
    async fn test_produce_outcomes() {
        let service = service();
        service
            .relay()
            .create_channel(Some(ChannelId::parse("ctx-1").unwrap()))
            .await;
        let app = service.router();

        let response = app
            .clone()
            .oneshot(post_req("/channels/ctx-1/messages", "{\"line\":1}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json(response).await["outcome"], "buffered");

        let response = app
            .oneshot(post_req("/channels/nobody/messages", "x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json(response).await;
        assert_eq!(body["outcome"], "dropped");
        assert_eq!(body["reason"], "unknown_channel");

        assert_eq!(
            service
                .relay()
                .backlog_len(&ChannelId::parse("ctx-1").unwrap()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_produce_too_large() {
        let mut config = RelayConfig::default();
        config.http.max_message_size = 8;
        let service = service_with(config);
        service
            .relay()
            .create_channel(Some(ChannelId::parse("ctx-1").unwrap()))
            .await;

        let response = service
            .router()
            .oneshot(post_req("/channels/ctx-1/messages", "this is too long"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_stream_requires_token() {
        let response = service().router().oneshot(stream_req(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["code"], codes::MISSING_TOKEN);
    }

    #[tokio::test]
    async fn test_stream_rejects_bad_token() {
        let service = service();
        let app = service.router();

        let response = app
            .clone()
            .oneshot(stream_req(Some("garbage")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(stream_req(Some(UNAVAILABLE_TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(service.relay().stats().attaches_rejected, 2);
    }

    #[tokio::test]
    async fn test_stream_valid_token_without_upgrade() {
        let service = service();
        let grant = service
            .relay()
            .create_channel(Some(ChannelId::parse("ctx-1").unwrap()))
            .await;
        service
            .relay()
            .produce(&ChannelId::parse("ctx-1").unwrap(), "kept");

        let response = service
            .router()
            .oneshot(stream_req(Some(grant.token.as_str())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        // No attach happened, so the backlog is still there
        assert_eq!(
            service
                .relay()
                .backlog_len(&ChannelId::parse("ctx-1").unwrap()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_health_and_stats() {
        let mut config = RelayConfig::default();
        config.environment = Environment::Test;
        let app = service_with(config).router();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json(response).await["status"], "ok");

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["channels_created"], 0);
    }

    #[tokio::test]
    async fn test_extra_routes_are_mounted() {
        let app = service()
            .with_routes(Router::new().route("/metrics", get(|| async { "relay_up 1\n" })))
            .router();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
