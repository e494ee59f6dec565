//! CORS policy for browser viewers polling job status.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};

use cadhub_core::config::CorsConfig;

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v == "*")
}

/// Builds the CORS layer. A `"*"` entry allows any origin or header;
/// unparsable entries are dropped with a warning.
pub fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if is_wildcard(&config.allowed_origins) {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(parse_all::<HeaderValue>("origin", &config.allowed_origins))
    };

    let headers = if is_wildcard(&config.allowed_headers) {
        AllowHeaders::from(Any)
    } else {
        AllowHeaders::list(parse_all::<HeaderName>("header", &config.allowed_headers))
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(parse_all::<Method>("method", &config.allowed_methods))
        .allow_headers(headers)
        .expose_headers([axum::http::header::CONTENT_DISPOSITION])
        .max_age(Duration::from_secs(config.max_age_seconds))
}

fn parse_all<T: std::str::FromStr>(what: &str, values: &[String]) -> Vec<T> {
    values
        .iter()
        .filter_map(|v| match v.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(value = %v, "Ignoring invalid CORS {}", what);
                None
            }
        })
        .collect()
}
