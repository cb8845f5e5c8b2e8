use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use shifter_application::{AnalyticsEvent, AnalyticsLayer};
use shifter_core::config::LoggingSettings;

/// Installs the global subscriber: human-readable logs on stderr filtered by
/// `RUST_LOG` (falling back to the configured level), plus the analytics layer.
///
/// Returns the receiving end of the analytics channel.
pub fn init(settings: &LoggingSettings) -> UnboundedReceiver<AnalyticsEvent> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let (analytics, events) = AnalyticsLayer::channel();

    tracing_subscriber::registry()
        .with(analytics)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    events
}
