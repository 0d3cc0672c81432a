//! Patient portal - backend-for-frontend server.
//!
//! Serves the portal frontend's JSON API. Session state lives in cookies;
//! everything patient-owned is proxied to the CRM, chat goes through the
//! messenger service and the cart through WooCommerce.
//!
//! Every upstream is optional at startup: a missing variable turns the
//! routes that need it into 500s instead of refusing to boot.

#![cfg_attr(not(test), forbid(unsafe_code))]

use patient_portal::config::PortalConfig;
use patient_portal::state::AppState;
use patient_portal::{routes, telemetry};

#[tokio::main]
async fn main() {
    let config = PortalConfig::from_env().expect("Failed to load configuration");

    // Sentry first so the tracing layer has a client to report to
    let _sentry_guard = telemetry::init_sentry(&config.sentry);
    telemetry::init_tracing();

    if config.crm.host.is_none() {
        tracing::warn!("CRM_HOST is not set; patient routes will fail");
    }
    if config.debug_payloads {
        tracing::warn!("Upstream payload logging is enabled");
    }

    let addr = config.socket_addr();
    let state = AppState::new(config).expect("Failed to initialize application state");

    let app = routes::app(state)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, "patient portal listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }

    tracing::info!("draining connections");
}
