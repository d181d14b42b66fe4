use axum::{
    http::{HeaderValue, Request},
    middleware::Next,
};
use tracing::Instrument;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const DEFAULT_LOG_FILTER: &str =
    "claimgenius_service=debug,claim_pipeline=debug,tower_http=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// `LOG_FORMAT` (`pretty`, anything else is JSON) and the `RUST_LOG` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub filter: String,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = match lookup("LOG_FORMAT") {
            Some(raw) if raw.trim().eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };
        let filter = lookup("RUST_LOG")
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Self { format, filter }
    }
}

/// JSON output carries the current span, so `run_id` and `correlation_id`
/// land on every event of a claim run.
pub fn init_tracing(settings: &LogSettings) {
    let env_filter =
        EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    match settings.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_level(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init(),
    }
}

/// Tags every request with a fresh correlation id, both as a header for
/// downstream handlers and as a field on the request span.
pub async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> LogSettings {
        LogSettings::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn json_with_service_filter_by_default() {
        let settings = settings(&[]);
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn pretty_format_and_custom_filter() {
        let settings = settings(&[("LOG_FORMAT", " Pretty "), ("RUST_LOG", "claim_pipeline=trace")]);
        assert_eq!(settings.format, LogFormat::Pretty);
        assert_eq!(settings.filter, "claim_pipeline=trace");
    }

    #[test]
    fn unknown_format_and_blank_filter_fall_back() {
        let settings = settings(&[("LOG_FORMAT", "xml"), ("RUST_LOG", "  ")]);
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.filter, DEFAULT_LOG_FILTER);
    }
}
