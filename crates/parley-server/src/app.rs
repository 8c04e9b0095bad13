use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}},
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::state::{AppState, AppStateInner};
use parley_api::uploads::{CloudinaryStore, ImageStore, LocalImageStore};
use parley_crypto::Cipher;
use parley_db::Database;
use parley_gateway::presence::PresenceRegistry;
use parley_types::api::HealthResponse;

use crate::config::{Config, Profile};

const DEV_CLIENT_ORIGIN: &str = "http://localhost:5173";

/// Open storage and build the shared state the handlers run against.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let db = Database::open(&config.db_path)?;

    if config.encryption_key.is_none() {
        warn!("PARLEY_ENCRYPTION_KEY unset, messages will not survive a restart");
    }
    let cipher = Cipher::from_secret(config.encryption_key.as_deref());

    let images = match &config.cloudinary {
        Some(cloud) => ImageStore::Cloudinary(CloudinaryStore::new(
            cloud.cloud_name.clone(),
            cloud.api_key.clone(),
            cloud.api_secret.clone(),
        )?),
        None => {
            info!("Image uploads stored under {}", config.upload_dir.display());
            ImageStore::Local(LocalImageStore::new(config.upload_dir.clone(), &config.public_url))
        }
    };

    Ok(Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        cipher,
        images,
        presence: PresenceRegistry::new(),
    }))
}

/// Full HTTP surface: REST routes, health, the gateway when enabled, CORS and tracing.
pub fn build_app(state: AppState, config: &Config) -> Router {
    let health = HealthResponse {
        ok: true,
        client_url: config.client_url.clone(),
        environment: config.profile.to_string(),
    };

    let mut app = parley_api::routes::router(state.clone()).merge(
        Router::new()
            .route("/api/health", get(health_check))
            .with_state(Arc::new(health)),
    );

    if config.enable_sockets {
        app = app.merge(parley_gateway::router(state.presence.clone()));
    } else {
        info!("Realtime gateway disabled");
    }

    app.layer(cors(config)).layer(TraceLayer::new_for_http())
}

async fn health_check(State(health): State<Arc<HealthResponse>>) -> Json<HealthResponse> {
    Json(health.as_ref().clone())
}

/// The local dev client plus the configured client URL, with credentials.
fn cors(config: &Config) -> CorsLayer {
    let mut origins = vec![HeaderValue::from_static(DEV_CLIENT_ORIGIN)];
    if config.client_url != DEV_CLIENT_ORIGIN {
        match HeaderValue::from_str(&config.client_url) {
            Ok(origin) => origins.push(origin),
            Err(_) => warn!("Ignoring unusable client URL {:?} for CORS", config.client_url),
        }
    }
    if config.profile == Profile::Production && config.client_url == DEV_CLIENT_ORIGIN {
        warn!("PARLEY_CLIENT_URL not set in production, only the dev origin is allowed");
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn config_with_sockets(sockets: &str) -> Config {
        Config::from_lookup(|name| match name {
            "PARLEY_DB_PATH" => Some(":memory:".into()),
            "PARLEY_JWT_SECRET" => Some("app-test-secret".into()),
            "PARLEY_CLIENT_URL" => Some("https://chat.example.com".into()),
            "PARLEY_ENABLE_SOCKETS" => Some(sockets.into()),
            _ => None,
        })
        .unwrap()
    }

    fn test_config() -> Config {
        config_with_sockets("true")
    }

    async fn gateway_status(config: &Config) -> StatusCode {
        let app = build_app(build_state(config).unwrap(), config);
        app.oneshot(Request::get("/gateway").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn health_reports_client_url_and_environment() {
        let config = test_config();
        let app = build_app(build_state(&config).unwrap(), &config);

        let resp = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(health.ok);
        assert_eq!(health.client_url, "https://chat.example.com");
        assert_eq!(health.environment, "development");
    }

    #[tokio::test]
    async fn cors_allows_only_known_origins() {
        let config = test_config();
        let app = build_app(build_state(&config).unwrap(), &config);

        for (origin, allowed) in [
            ("http://localhost:5173", true),
            ("https://chat.example.com", true),
            ("https://evil.example.com", false),
        ] {
            let resp = app
                .clone()
                .oneshot(
                    Request::get("/api/health")
                        .header(header::ORIGIN, origin)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let echoed = resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN);
            assert_eq!(echoed.is_some(), allowed, "{origin}");
        }
    }

    #[tokio::test]
    async fn gateway_is_absent_when_sockets_are_disabled() {
        let config = config_with_sockets("false");
        assert_eq!(config.profile, Profile::Development);
        assert!(!config.enable_sockets);
        assert_eq!(gateway_status(&config).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn gateway_is_mounted_when_sockets_are_enabled() {
        // Plain GET without upgrade headers: the route exists but rejects it
        let status = gateway_status(&test_config()).await;
        assert_ne!(status, StatusCode::NOT_FOUND);
        assert!(status.is_client_error());
    }
}
