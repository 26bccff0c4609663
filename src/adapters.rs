//! Key extraction adapters: explicit, composable strategies for deriving a
//! rate-limit fingerprint from an inbound request. No framework
//! auto-detection — callers pick and order the adapters themselves.

use http::request::Parts;

/// Derives a fingerprint from request parts, or `None` if this strategy
/// doesn't apply to the given request.
pub trait KeyExtractor: Send + Sync {
    fn extract_key(&self, parts: &Parts) -> Option<String>;
}

/// Reads a configurable header (e.g. `x-api-key`), falling back to the
/// connection's peer address (via the `x-forwarded-for` header, if present)
/// when the header is absent.
pub struct HeaderKeyExtractor {
    header_name: http::header::HeaderName,
}

impl HeaderKeyExtractor {
    pub fn new(header_name: &str) -> Self {
        Self {
            header_name: http::header::HeaderName::from_bytes(header_name.as_bytes())
                .expect("valid header name"),
        }
    }
}

impl KeyExtractor for HeaderKeyExtractor {
    fn extract_key(&self, parts: &Parts) -> Option<String> {
        if let Some(value) = parts.headers.get(&self.header_name) {
            return value.to_str().ok().map(str::to_string);
        }
        parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
    }
}

/// Tries each extractor in order, returning the first match.
pub fn extract_first(extractors: &[Box<dyn KeyExtractor>], parts: &Parts) -> Option<String> {
    extractors.iter().find_map(|extractor| extractor.extract_key(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn parts_with_header(name: &str, value: &str) -> Parts {
        let (parts, _) = Request::builder().header(name, value).body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn extracts_configured_header() {
        let extractor = HeaderKeyExtractor::new("x-api-key");
        let parts = parts_with_header("x-api-key", "abc123");
        assert_eq!(extractor.extract_key(&parts), Some("abc123".to_string()));
    }

    #[test]
    fn falls_back_to_forwarded_for() {
        let extractor = HeaderKeyExtractor::new("x-api-key");
        let parts = parts_with_header("x-forwarded-for", "1.2.3.4, 5.6.7.8");
        assert_eq!(extractor.extract_key(&parts), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn returns_none_when_nothing_present() {
        let extractor = HeaderKeyExtractor::new("x-api-key");
        let (parts, _) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(extractor.extract_key(&parts), None);
    }
}
