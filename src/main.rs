use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pixellog::{auth, config::Settings, db, state::AppState, stats, tracker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    let tz = settings.reference_timezone()?;
    info!("Reference timezone: {}", tz);

    let session_secret = auth::resolve_session_secret(&settings);

    info!("Connecting to database...");
    let pool = db::create_pool(
        &settings.database_url(),
        settings.db_max_connections,
        Duration::from_secs(settings.db_acquire_timeout_secs),
    )
    .await?;
    info!("Database connected");

    info!("Running migrations...");
    db::run_migrations(&pool).await?;
    info!("Migrations complete");

    let addr = settings.bind_addr()?;

    let state = AppState::new(pool, settings, tz, session_secret);

    // CORS layer
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any);

    // Stats routes sit behind the session guard; login and tracking do not.
    let protected = Router::new()
        .route("/stats/api", get(stats::stats_handler))
        .route("/stats/visitors", get(stats::visitors_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let app = Router::new()
        .route("/track", get(tracker::pixel_handler))
        .route("/health", get(stats::health_handler))
        .route("/stats/login", post(auth::login_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
