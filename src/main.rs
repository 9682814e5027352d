// src/main.rs

// --- Modules ---
mod config;
mod db;
mod error;
mod models;
mod scheduler;
mod services;
mod state;
mod templates;
mod web;

// --- Imports ---
use crate::{config::Config, services::account_service, state::AppState};
use axum::serve;
use std::sync::Arc;
use time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::Key, ExpiredDeletion, Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Logging ---
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "merit_tracker=debug,tower_http=info,sqlx=warn,tower_sessions=info".into()
        }))
        .with(fmt::layer())
        .init();

    tracing::info!("🚀 Starting merit tracker...");

    let config = Arc::new(Config::from_env().map_err(|e| {
        tracing::error!("❌ Invalid configuration: {}", e);
        anyhow::anyhow!("Invalid configuration: {}", e)
    })?);

    // --- Database ---
    let db_pool = match db::create_db_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("❌ Failed to initialise the database: {}", e);
            return Err(anyhow::anyhow!("Failed to connect/migrate DB: {}", e));
        }
    };

    match &config.admin {
        Some(admin) => {
            account_service::ensure_bootstrap_admin(&db_pool, admin)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create bootstrap admin: {}", e))?;
        }
        None => tracing::warn!("⚠️ ADMIN_LOGIN_ID / ADMIN_PASSWORD not set, no bootstrap admin."),
    }

    // --- Sessions ---
    let session_store = SqliteStore::new(db_pool.clone())
        .with_table_name("sessions")
        .map_err(|e| anyhow::anyhow!("Failed to create session store: {}", e))?;
    session_store.migrate().await?;

    let cleanup_store = session_store.clone();
    tokio::spawn(async move {
        if let Err(e) = cleanup_store
            .continuously_delete_expired(tokio::time::Duration::from_secs(60 * 60))
            .await
        {
            tracing::error!("Session cleanup task failed: {:?}", e);
        }
    });
    tracing::info!("🧹 Session cleanup task started.");

    let key = Key::try_from(config.session_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("SESSION_SECRET is not a usable key: {}", e))?;
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.session_secure)
        .with_http_only(true)
        .with_expiry(Expiry::OnInactivity(Duration::days(1)))
        .with_signed(key);
    tracing::info!("🔑 Session layer configured.");

    // --- Background jobs ---
    if scheduler::spawn_daily_reports(db_pool.clone(), config.clone()).is_some() {
        tracing::info!(
            "📬 Daily reports scheduled at {:02}:{:02} (UTC{:+}).",
            config.report.hour,
            config.report.minute,
            config.report.utc_offset_hours
        );
    }

    let app_state = AppState {
        db_pool,
        config: config.clone(),
    };

    // --- Listener ---
    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("❌ Failed to bind {}: {}", config.bind_addr, e);
            return Err(e.into());
        }
    };
    tracing::info!("📡 Listening on http://{}", config.bind_addr);

    let app = web::routes::create_router(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(session_layer),
    );

    if let Err(e) = serve(listener, app.into_make_service()).await {
        tracing::error!("❌ Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
