//! Axum router and lifecycle for the broker's HTTP endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{HeaderName, CACHE_CONTROL, CONTENT_TYPE, IF_MODIFIED_SINCE, RANGE, USER_AGENT};
use axum::http::Method;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use enface_broker::{Broker, BrokerConfig, Outcome};
use enface_settings::{BrokerSettings, ServerSettings, HEALTH_PATH};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::health::{self, HealthResponse};

/// Response body for an exchange that was closed without a reply.
pub const CLOSED_BODY: &str = "timeout";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    /// Cancelled on shutdown; releases every parked exchange.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self {
            broker,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Broker configuration for a deployment: the verification server calls
/// back to the public base URL plus the route this server listens on.
pub fn broker_config(settings: &BrokerSettings) -> BrokerConfig {
    BrokerConfig::new(
        settings.project_id.clone(),
        settings.fields.clone(),
        format!("{}{}", settings.normalized_callback_url(), settings.server.path),
        settings.ttl(),
    )
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("dnt"),
            USER_AGENT,
            HeaderName::from_static("x-requested-with"),
            IF_MODIFIED_SINCE,
            CACHE_CONTROL,
            CONTENT_TYPE,
            RANGE,
        ])
}

/// Build the Axum router. `path` must not be [`HEALTH_PATH`].
pub fn router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, post(handshake_handler).options(preflight_handler))
        .route(HEALTH_PATH, get(health_handler))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// POST <path>: one command envelope in, one reply out. Invalid UTF-8 is
/// replaced rather than rejected so the caller still gets an error envelope.
async fn handshake_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let body = String::from_utf8_lossy(&body);
    let outcome = tokio::select! {
        outcome = state.broker.request(&body) => outcome,
        () = state.shutdown.cancelled() => Outcome::Closed,
    };
    match outcome {
        Outcome::Reply(reply) => Json(reply).into_response(),
        Outcome::Closed => CLOSED_BODY.into_response(),
    }
}

/// OPTIONS <path> without CORS preflight headers.
async fn preflight_handler() -> &'static str {
    ""
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.broker.sessions().len()))
}

/// Bind and serve in the background. Returns a handle to shut it down.
pub async fn start(settings: &ServerSettings, broker: Arc<Broker>) -> std::io::Result<ServerHandle> {
    let state = AppState::new(broker);
    let shutdown = state.shutdown.clone();
    let app = router(state, &settings.path);

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, path = %settings.path, "enface broker listening");

    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move { token.cancelled().await });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "server terminated");
        }
    });

    Ok(ServerHandle { addr, shutdown, task })
}

/// Handle returned by [`start()`].
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, answer parked exchanges with [`CLOSED_BODY`] and wait
    /// for in-flight responses to drain.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "server task did not exit cleanly");
        }
        tracing::info!(addr = %self.addr, "enface broker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use enface_core::cipher::TokenCipher;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    const PATH: &str = "/enfaceauth";

    fn make_state() -> AppState {
        let config = BrokerConfig::new(
            "project-1",
            "email",
            "https://example.com/enfaceauth",
            Duration::from_secs(600),
        );
        AppState::new(Arc::new(Broker::new(config, TokenCipher::new([3u8; 32]))))
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(PATH)
            .header("origin", "https://widget.example.com")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        serde_json::from_str(&body_text(resp).await).unwrap()
    }

    #[test]
    fn broker_config_appends_route_path() {
        let settings = BrokerSettings {
            project_id: "p".into(),
            callback_url: "https://auth.example.com/".into(),
            ..Default::default()
        };
        let config = broker_config(&settings);
        assert_eq!(config.callback_url, "https://auth.example.com/enfaceauth");
        assert_eq!(config.ttl, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn auth_returns_token() {
        let state = make_state();
        let app = router(state.clone(), PATH);

        let resp = app.oneshot(post(r#"{"_":"auth"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        let reply = body_json(resp).await;
        assert_eq!(reply["_"], "auth");
        assert_eq!(reply["id"], "project-1");
        assert_eq!(reply["fields"], "email");
        assert!(reply["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert!(reply["connectionId"].is_string());
        assert_eq!(state.broker.sessions().len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_returns_error_reply() {
        let state = make_state();
        let app = router(state.clone(), PATH);

        let resp = app.oneshot(post("not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let reply = body_json(resp).await;
        assert_eq!(reply, json!({"_": "error", "message": "Wrong data received not json"}));
        assert!(state.broker.sessions().is_empty());
    }

    #[tokio::test]
    async fn non_utf8_body_returns_error_reply() {
        let state = make_state();
        let app = router(state.clone(), PATH);
        let req = Request::builder()
            .method(Method::POST)
            .uri(PATH)
            .body(Body::from(vec![b'{', 0xff, 0xfe, b'}']))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let reply = body_json(resp).await;
        assert_eq!(reply["_"], "error");
        let message = reply["message"].as_str().unwrap();
        assert!(message.starts_with("Wrong data received"), "got: {message}");
        assert!(state.broker.sessions().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_check_returns_error_reply() {
        let app = router(make_state(), PATH);
        let resp = app
            .oneshot(post(r#"{"_":"check","sessionId":"nope"}"#))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["message"], "Client not found");
    }

    #[tokio::test]
    async fn options_returns_empty_body() {
        let app = router(make_state(), PATH);
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(PATH)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "");
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let app = router(make_state(), PATH);
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(PATH)
            .header("origin", "https://widget.example.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        let methods = headers
            .get("access-control-allow-methods")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(methods.contains("POST"));
        let allowed = headers
            .get("access-control-allow-headers")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(allowed.contains("content-type"));
        assert!(allowed.contains("x-requested-with"));
    }

    #[tokio::test]
    async fn health_reports_session_count() {
        let state = make_state();
        let app = router(state.clone(), PATH);

        let resp = app.clone().oneshot(post(r#"{"_":"auth"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder().uri(HEALTH_PATH).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"status": "ok", "sessions": 1}));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = router(make_state(), PATH);
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn shutdown_releases_parked_exchange() {
        let state = make_state();
        let app = router(state.clone(), PATH);

        let first = body_json(app.clone().oneshot(post(r#"{"_":"auth"}"#)).await.unwrap()).await;
        let connection_id = first["connectionId"].as_str().unwrap().to_owned();

        let follow_up = format!(r#"{{"_":"auth","connectionId":"{connection_id}"}}"#);
        let parked = tokio::spawn(app.oneshot(post(&follow_up)));

        // Give the follow-up time to park on the session.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!parked.is_finished());

        state.shutdown.cancel();
        let resp = parked.await.unwrap().unwrap();
        assert_eq!(body_text(resp).await, CLOSED_BODY);
    }
}
