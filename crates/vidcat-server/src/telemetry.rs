use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "vidcat=debug,sqlx=warn";

/// Install the global subscriber. `LOG_FORMAT=json` switches the console
/// output to one JSON object per line.
pub fn init_telemetry(log_format: Option<&str>) -> Result<(), anyhow::Error> {
    let json = log_format.is_some_and(|f| f.eq_ignore_ascii_case("json"));

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
    });
    let console_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer().event_format(Format::default().compact().with_target(false))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::debug!(json, "Tracing initialized");
    Ok(())
}
