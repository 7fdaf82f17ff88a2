//! Rate-limit telemetry.
//!
//! Every API response may carry `Sforce-Limit-Info: api-usage=<A>/<B>`. The
//! interceptor wraps each outbound call, parses that header and hands the
//! descriptor back with the response. It only observes; it never throttles.
//!
//! The header reports usage, not remaining capacity, but the two numbers are
//! kept in the `remaining` / `limit` slots positionally so consumers that
//! already understand the upstream quirk see the same values.

use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response};
use tracing::trace;
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::types::{RateLimitDescriptor, RateLimitStatus};

/// Response header carrying API usage.
pub const RATE_LIMIT_HEADER: &str = "Sforce-Limit-Info";

/// Parse an `api-usage=<remaining>/<limit>` header value.
///
/// Returns `None` for anything that does not match; a malformed header is
/// "no information", not an error.
#[must_use]
pub fn parse_limit_info(value: &str) -> Option<RateLimitDescriptor> {
    let usage = value.trim().strip_prefix("api-usage=")?;
    let (remaining, rest) = usage.split_once('/')?;
    let remaining = remaining.trim().parse::<i64>().ok()?;
    // Anything after the limit, such as a per-app usage suffix, is ignored.
    let rest = rest.trim_start();
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let limit = rest[..digits].parse::<i64>().ok()?;

    let status = if remaining > limit {
        RateLimitStatus::Overlimit
    } else {
        RateLimitStatus::Ok
    };

    Some(RateLimitDescriptor {
        status,
        limit,
        remaining,
    })
}

/// Extract the descriptor from response headers, if present.
///
/// Only a single-valued header is trusted.
#[must_use]
pub fn descriptor_from_headers(headers: &HeaderMap) -> Option<RateLimitDescriptor> {
    let mut values = headers.get_all(RATE_LIMIT_HEADER).iter();
    let value = values.next()?;
    if values.next().is_some() {
        trace!("repeated rate limit header, ignoring");
        return None;
    }
    value.to_str().ok().and_then(parse_limit_info)
}

/// Wraps the transport's send-and-receive step.
#[derive(Debug, Default)]
pub struct RateLimitInterceptor {
    last: Mutex<Option<RateLimitDescriptor>>,
}

impl RateLimitInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous call's descriptor.
    pub fn clear(&self) {
        *self.last.lock() = None;
    }

    /// Record the descriptor carried by `headers`, replacing the previous one.
    pub fn observe(&self, headers: &HeaderMap) -> Option<RateLimitDescriptor> {
        let descriptor = descriptor_from_headers(headers);
        trace!(?descriptor, "observed rate limit");
        *self.last.lock() = descriptor;
        descriptor
    }

    /// Descriptor of the most recent call.
    #[must_use]
    pub fn last(&self) -> Option<RateLimitDescriptor> {
        *self.last.lock()
    }

    /// Send a request and return the response with its descriptor.
    pub async fn send(
        &self,
        request: RequestBuilder,
    ) -> ConnectorResult<(Response, Option<RateLimitDescriptor>)> {
        self.clear();
        let response = request
            .send()
            .await
            .map_err(|e| ConnectorError::network_with_source("request failed", e))?;
        let descriptor = self.observe(response.headers());
        Ok((response, descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_overlimit() {
        let descriptor = parse_limit_info("api-usage=120/100").unwrap();
        assert_eq!(descriptor.status, RateLimitStatus::Overlimit);
        assert_eq!(descriptor.limit, 100);
        assert_eq!(descriptor.remaining, 120);
    }

    #[test]
    fn test_parse_ok() {
        let descriptor = parse_limit_info("api-usage=25/15000").unwrap();
        assert_eq!(descriptor.status, RateLimitStatus::Ok);
        assert_eq!(descriptor.limit, 15000);
        assert_eq!(descriptor.remaining, 25);

        // equal is not over
        assert_eq!(
            parse_limit_info("api-usage=100/100").unwrap().status,
            RateLimitStatus::Ok
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_limit_info("").is_none());
        assert!(parse_limit_info("api-usage=12").is_none());
        assert!(parse_limit_info("api-usage=a/b").is_none());
        assert!(parse_limit_info("per-app-api-usage=1/2").is_none());
        assert!(parse_limit_info("api-usage=12/").is_none());
        assert!(parse_limit_info("api-usage=12/x100").is_none());
    }

    #[test]
    fn test_parse_ignores_per_app_suffix() {
        let descriptor =
            parse_limit_info("api-usage=18/5000; per-app-api-usage=17/250(appName=sample-app)")
                .unwrap();
        assert_eq!(descriptor.status, RateLimitStatus::Ok);
        assert_eq!(descriptor.remaining, 18);
        assert_eq!(descriptor.limit, 5000);
    }

    #[test]
    fn test_repeated_header_is_no_information() {
        let mut headers = HeaderMap::new();
        headers.append(RATE_LIMIT_HEADER, HeaderValue::from_static("api-usage=5/10"));
        assert_eq!(descriptor_from_headers(&headers).unwrap().limit, 10);

        headers.append(RATE_LIMIT_HEADER, HeaderValue::from_static("api-usage=6/10"));
        assert!(descriptor_from_headers(&headers).is_none());
    }

    #[test]
    fn test_observe_resets_on_missing_header() {
        let interceptor = RateLimitInterceptor::new();

        let mut headers = HeaderMap::new();
        headers.insert(RATE_LIMIT_HEADER, HeaderValue::from_static("api-usage=5/10"));
        assert!(interceptor.observe(&headers).is_some());
        assert_eq!(interceptor.last().unwrap().remaining, 5);

        assert!(interceptor.observe(&HeaderMap::new()).is_none());
        assert!(interceptor.last().is_none());
    }

    #[test]
    fn test_clear() {
        let interceptor = RateLimitInterceptor::new();
        let mut headers = HeaderMap::new();
        headers.insert(RATE_LIMIT_HEADER, HeaderValue::from_static("api-usage=5/10"));
        interceptor.observe(&headers);
        interceptor.clear();
        assert!(interceptor.last().is_none());
    }
}
