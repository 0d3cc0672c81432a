//! Sentry and tracing bootstrap.
//!
//! Patient requests carry bearer tokens in cookies and, for auto-login, in
//! the query string. Events are scrubbed of both before they leave the
//! process.

use std::borrow::Cow;
use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use sentry::protocol::{Event, Request};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::SentryConfig;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "patient_portal=info,tower_http=debug";

/// Request headers that never reach Sentry.
const SCRUBBED_HEADERS: [&str; 3] = ["authorization", "cookie", "x-shared-secret"];

/// Initialize Sentry. The returned guard must outlive the server.
#[must_use]
pub fn init_sentry(config: &SentryConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.dsn.as_deref()?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config.environment.clone().map(Cow::Owned),
            sample_rate: config.sample_rate,
            traces_sample_rate: config.traces_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            before_send: Some(Arc::new(|mut event: Event<'static>| {
                if let Some(request) = event.request.as_mut() {
                    scrub_request(request);
                }
                Some(event)
            })),
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Install the global subscriber: `EnvFilter`, console output and the
/// Sentry layer. Call after [`init_sentry`].
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(event_filter))
        .init();
}

/// Warnings and errors become events; info and debug become breadcrumbs.
fn event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn scrub_request(request: &mut Request) {
    request.cookies = None;
    request
        .headers
        .retain(|name, _| !SCRUBBED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)));

    let carries_token = |query: &str| query.contains("token");
    if request.query_string.as_deref().is_some_and(carries_token) {
        request.query_string = Some("[Filtered]".to_string());
    }
    if let Some(url) = request.url.as_mut()
        && url.query().is_some_and(carries_token)
    {
        url.set_query(None);
    }
}
