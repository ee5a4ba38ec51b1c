//! RealSync API Gateway
//!
//! HTTP ingress for the consumption accounting service:
//! - usage reports from the tunnel edge
//! - monthly consumption history for the dashboard
//! - tunnel provisioning and enablement

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use uuid::Uuid;

use realsync_accounting::{
    AccountingConfig, ConsumptionAccountant, SqliteStore, TunnelRegistry, UsageReport,
};
use realsync_common::{DomainConsumption, RealSyncError, Tunnel, TunnelError};

// ============ STATE ============

#[derive(Clone)]
struct AppState {
    accountant: Arc<ConsumptionAccountant>,
    registry: Arc<dyn TunnelRegistry>,
}

// ============ REQUEST/RESPONSE TYPES ============

#[derive(Debug, Deserialize)]
struct UpdateConsumptionRequest {
    domain: String,
    traffic: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateConsumptionResponse {
    message: String,
    data_usage: u64,
}

#[derive(Debug, Deserialize)]
struct CreateTunnelRequest {
    domain: String,
}

// ============ ERRORS ============

/// Maps accounting errors onto the HTTP surface
struct ApiError(RealSyncError);

impl From<RealSyncError> for ApiError {
    fn from(err: RealSyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            RealSyncError::Validation { errors } => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "errors": errors })),
            )
                .into_response(),
            RealSyncError::Tunnel(TunnelError::InvalidDomain(domain)) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "errors": [format!("invalid domain name: {}", domain)] })),
            )
                .into_response(),
            RealSyncError::Tunnel(TunnelError::DomainNotFound(domain)) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("no tunnel registered for domain: {}", domain) })),
            )
                .into_response(),
            RealSyncError::Tunnel(TunnelError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("tunnel not found: {}", id) })),
            )
                .into_response(),
            RealSyncError::Tunnel(TunnelError::DomainTaken(domain)) => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({ "error": format!("domain already registered: {}", domain) })),
            )
                .into_response(),
            RealSyncError::Tunnel(TunnelError::Disabled(domain)) => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": format!("tunnel is disabled: {}", domain) })),
            )
                .into_response(),
            other => {
                error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

// ============ HANDLERS ============

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "accounting": true,
            "registry": true
        }
    }))
}

async fn update_consumption(
    State(state): State<AppState>,
    Json(req): Json<UpdateConsumptionRequest>,
) -> Result<Json<UpdateConsumptionResponse>, ApiError> {
    let report = UsageReport::new(req.domain, req.traffic);
    let outcome = state.accountant.report_usage(&report).await?;

    Ok(Json(UpdateConsumptionResponse {
        message: "Consumption updated".to_string(),
        data_usage: outcome.data_usage,
    }))
}

async fn domain_consumption(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<DomainConsumption>, ApiError> {
    let consumption = state.accountant.monthly_history(&domain).await?;
    Ok(Json(consumption))
}

async fn create_tunnel(
    State(state): State<AppState>,
    Json(req): Json<CreateTunnelRequest>,
) -> Result<(StatusCode, Json<Tunnel>), ApiError> {
    let tunnel = state.registry.register(&req.domain).await?;
    info!(domain = %tunnel.domain, id = %tunnel.id, "Provisioned tunnel");
    Ok((StatusCode::CREATED, Json(tunnel)))
}

async fn list_tunnels(State(state): State<AppState>) -> Result<Json<Vec<Tunnel>>, ApiError> {
    let tunnels = state.registry.list().await?;
    Ok(Json(tunnels))
}

async fn enable_tunnel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Tunnel>, ApiError> {
    let tunnel = state.registry.set_enabled(id, true).await?;
    Ok(Json(tunnel))
}

async fn disable_tunnel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Tunnel>, ApiError> {
    let tunnel = state.registry.set_enabled(id, false).await?;
    Ok(Json(tunnel))
}

// ============ ROUTER ============

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))
        // Consumption accounting
        .route("/consumption/update-consumption", post(update_consumption))
        .route("/consumption/:domain", get(domain_consumption))
        // Tunnel registry
        .route("/tunnels", get(list_tunnels).post(create_tunnel))
        .route("/tunnels/:id/enable", post(enable_tunnel))
        .route("/tunnels/:id/disable", post(disable_tunnel))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

// ============ MAIN ============

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_gateway=info".parse()?)
                .add_directive("realsync_accounting=info".parse()?),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();

    let config = AccountingConfig::load()?;
    let store = Arc::new(SqliteStore::connect(&config.database_url, config.max_connections).await?);
    let accountant = Arc::new(ConsumptionAccountant::new(store.clone(), store.clone()));

    let state = AppState {
        accountant,
        registry: store,
    };

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{}", port);
    info!("RealSync API Gateway starting on {}", addr);
    info!("Endpoints: /health, /consumption/update-consumption, /consumption/:domain, /tunnels");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use realsync_accounting::InMemoryStore;
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let accountant = Arc::new(ConsumptionAccountant::new(store.clone(), store.clone()));
        let state = AppState {
            accountant,
            registry: store.clone(),
        };
        (app(state), store)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_update_consumption_accumulates() {
        let (app, store) = test_app();
        store.register("acme.example.com").await.unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                "/consumption/update-consumption",
                serde_json::json!({ "domain": "acme.example.com", "traffic": 100 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                "/consumption/update-consumption",
                serde_json::json!({ "domain": "acme.example.com", "traffic": 50 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["dataUsage"], 150);
    }

    #[tokio::test]
    async fn test_empty_domain_is_bad_request() {
        let (app, _) = test_app();

        let response = app
            .oneshot(post_json(
                "/consumption/update-consumption",
                serde_json::json!({ "domain": "", "traffic": 10 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        let errors = body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("domain"));
    }

    #[tokio::test]
    async fn test_negative_traffic_is_bad_request() {
        let (app, store) = test_app();
        store.register("acme.example.com").await.unwrap();

        let response = app
            .oneshot(post_json(
                "/consumption/update-consumption",
                serde_json::json!({ "domain": "acme.example.com", "traffic": -10 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_domain_is_not_found() {
        let (app, _) = test_app();

        let response = app
            .oneshot(post_json(
                "/consumption/update-consumption",
                serde_json::json!({ "domain": "unknown.example.com", "traffic": 10 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_consumption_history_round_trip() {
        let (app, store) = test_app();
        store.register("acme.example.com").await.unwrap();

        app.clone()
            .oneshot(post_json(
                "/consumption/update-consumption",
                serde_json::json!({ "domain": "acme.example.com", "traffic": 2048 }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/consumption/acme.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["domain"], "acme.example.com");
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["dataUsage"], 2048);
    }

    #[tokio::test]
    async fn test_history_for_fresh_tunnel_is_empty() {
        let (app, store) = test_app();
        store.register("acme.example.com").await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/consumption/acme.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["history"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tunnel_provisioning() {
        let (app, _) = test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/tunnels",
                serde_json::json!({ "domain": "acme.example.com" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post_json(
                "/tunnels",
                serde_json::json!({ "domain": "acme.example.com" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(Request::builder().uri("/tunnels").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_tunnel_refuses_reports() {
        let (app, store) = test_app();
        let tunnel = store.register("acme.example.com").await.unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/tunnels/{}/disable", tunnel.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                "/consumption/update-consumption",
                serde_json::json!({ "domain": "acme.example.com", "traffic": 10 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
