use anyhow::anyhow;
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webboard::config::AppConfig;
use webboard::{http, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let state = AppState::from_config(&config).await?;

    match config.app_mode.as_str() {
        "api" => {
            let flusher = tokio::spawn(jobs::log_flusher::run(
                state.activity.clone(),
                Duration::from_secs(config.log_flush_interval_seconds),
            ));

            let app: Router = http::router(state.clone(), &config).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            let app = app.into_make_service_with_connect_info::<SocketAddr>();
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            flusher.abort();
            let drained = state.activity.flush().await;
            tracing::info!(drained = drained, "flushed pending activity logs");
        }
        "seed" => {
            let admin = config
                .seed_admin
                .as_ref()
                .ok_or_else(|| anyhow!("SEED_ADMIN_EMAIL and SEED_ADMIN_PASSWORD are required"))?;
            jobs::seed::run(&state, admin).await?;
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
