use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,product_enricher=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
