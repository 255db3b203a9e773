// =============================================================================
// Client identity: rate-limit key extractor
// =============================================================================
//
// The key is `"<x-api-key>:<x-forwarded-for>"`. A missing, empty or
// non-UTF-8 header contributes the placeholder `default`, so anonymous
// callers behind the same proxy share one bucket.
//
// Usage as an Axum extractor:
//
//   async fn handler(ClientKey(key): ClientKey, ...) { ... }
// =============================================================================

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

const API_KEY_HEADER: &str = "x-api-key";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const PLACEHOLDER: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl ClientKey {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let part = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .unwrap_or(PLACEHOLDER)
        };
        Self(format!(
            "{}:{}",
            part(API_KEY_HEADER),
            part(FORWARDED_FOR_HEADER)
        ))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn both_headers_present() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("abc"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7"));
        assert_eq!(ClientKey::from_headers(&headers).0, "abc:10.0.0.7");
    }

    #[test]
    fn missing_or_empty_headers_use_placeholder() {
        let mut headers = HeaderMap::new();
        assert_eq!(ClientKey::from_headers(&headers).0, "default:default");

        headers.insert("x-api-key", HeaderValue::from_static(""));
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        assert_eq!(ClientKey::from_headers(&headers).0, "default:1.2.3.4");
    }

    #[test]
    fn non_utf8_header_uses_placeholder() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap());
        assert_eq!(ClientKey::from_headers(&headers).0, "default:default");
    }
}
