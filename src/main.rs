use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use http::HeaderValue;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use wallcraft_api as api;
use wallcraft_api::services::notifications::{
    NoopDispatcher, NotificationDispatcher, RedisNotificationQueue,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::init_schema(&db_pool).await.map_err(|e| {
            error!("Failed initializing schema: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Notification dispatcher: Redis queue when configured, otherwise a
    // no-op so a dead queue never blocks checkout.
    let notifications: Arc<dyn NotificationDispatcher> = if cfg.notifications_disabled {
        info!("Notifications disabled by configuration");
        Arc::new(NoopDispatcher)
    } else {
        match redis::Client::open(cfg.redis_url.clone()) {
            Ok(client) => Arc::new(RedisNotificationQueue::new(
                Arc::new(client),
                cfg.notification_queue.clone(),
            )),
            Err(err) => {
                error!(
                    "Failed to initialize Redis notification queue (falling back to no-op): {}",
                    err
                );
                Arc::new(NoopDispatcher)
            }
        }
    };

    let gateway = Arc::new(api::gateway::GatewayClient::from_config(&cfg)?);

    let state = api::AppState::build(
        db_arc,
        cfg.clone(),
        gateway,
        notifications,
        event_sender,
    );

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!("Using permissive CORS (development or explicit override)");
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration".into());
    };

    let app = Router::new()
        .route("/", get(|| async { "wallcraft-api up" }))
        .merge(api::api_routes())
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", api::openapi::ApiDoc::openapi()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(cors_layer),
        )
        .with_state(state);

    let addr = SocketAddr::new(cfg.host.parse()?, cfg.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("wallcraft-api listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
