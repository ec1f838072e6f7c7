use std::sync::OnceLock;

use sentry_tracing::{EventFilter, SentryLayer};
use tracing::Level;

static INIT_GUARD: OnceLock<Option<sentry::ClientInitGuard>> = OnceLock::new();

/// Initializes the sentry client once per process. Without a DSN this is a no-op
/// and the tracing layer below forwards nothing.
pub fn init_once(dsn: Option<&str>) {
    INIT_GUARD.get_or_init(|| {
        dsn.filter(|d| !d.trim().is_empty()).map(|dsn| {
            sentry::init((
                dsn.to_string(),
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    environment: Some(
                        if cfg!(debug_assertions) {
                            "dev"
                        } else {
                            "production"
                        }
                        .into(),
                    ),
                    ..Default::default()
                },
            ))
        })
    });
}

pub fn sentry_layer<S>() -> SentryLayer<S>
where
    S: tracing::Subscriber,
    S: for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    SentryLayer::default()
        .span_filter(|meta| matches!(*meta.level(), Level::DEBUG | Level::INFO | Level::WARN | Level::ERROR))
        .event_filter(|meta| match *meta.level() {
            Level::ERROR => EventFilter::Event,
            Level::DEBUG | Level::INFO | Level::WARN => EventFilter::Breadcrumb,
            Level::TRACE => EventFilter::Ignore,
        })
}
