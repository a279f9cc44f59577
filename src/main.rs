use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use matchable_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Event channel; confirmation emails are delivered from the processing
    // task, never from a request thread
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    let emails = Arc::new(api::services::EmailService::from_config(&cfg));
    tokio::spawn(api::events::process_events(
        event_rx,
        db.clone(),
        emails.clone(),
    ));

    let services = api::handlers::AppServices::new(db.clone(), Arc::new(event_sender.clone()), &cfg);

    let app_state = api::AppState {
        db: db.clone(),
        config: cfg.clone(),
        event_sender,
        services,
    };

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
        info!("using permissive CORS (no explicit origins configured)");
        CorsLayer::permissive()
    } else {
        error!("missing CORS configuration; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("missing CORS configuration".into());
    };

    // Global in-memory rate limiter
    let limiter = Arc::new(api::rate_limiter::RateLimiter::new(
        api::rate_limiter::RateLimitConfig {
            requests_per_window: cfg.rate_limit_requests_per_window,
            window_duration: std::time::Duration::from_secs(cfg.rate_limit_window_seconds),
            enable_headers: cfg.rate_limit_enable_headers,
        },
    ));

    let app = Router::new()
        .route("/", get(|| async { "matchable-api up" }))
        .nest("/api/v1", api::api_v1_routes())
        .merge(api::openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .layer(axum::middleware::from_fn_with_state(
            limiter,
            api::rate_limiter::rate_limit_middleware,
        ))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("matchable-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
