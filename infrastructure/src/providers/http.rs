//! HTTP plumbing shared by the LLM backends.

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use wrp_application::ports::llm_adapter::{AdapterError, AdapterErrorKind};
use wrp_domain::{ProviderKind, preview};

/// TCP connection timeout for backend requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body quoted in an [`AdapterError`].
const MAX_ERROR_DETAIL: usize = 300;

pub(crate) fn build_client(
    provider: ProviderKind,
    request_timeout: Duration,
) -> Result<Client, AdapterError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .user_agent(concat!("wrp/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            AdapterError::new(
                provider,
                AdapterErrorKind::Configuration,
                format!("failed to build HTTP client: {e}"),
            )
        })
}

/// POST `body` as JSON and decode the JSON answer.
pub(crate) async fn post_json(
    provider: ProviderKind,
    client: &Client,
    url: &str,
    headers: HeaderMap,
    body: &Value,
) -> Result<Value, AdapterError> {
    debug!(provider = %provider, url, "LLM request");
    let response = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| send_error(provider, e))?;

    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let text = response.text().await.map_err(|e| send_error(provider, e))?;

    if let Some(err) = classify_status(provider, status, retry_after, &text) {
        return Err(err);
    }
    serde_json::from_str(&text).map_err(|e| {
        AdapterError::malformed(
            provider,
            format!("response is not JSON ({e}): {}", preview(&text, MAX_ERROR_DETAIL)),
        )
    })
}

fn send_error(provider: ProviderKind, e: reqwest::Error) -> AdapterError {
    let kind = if e.is_timeout() {
        AdapterErrorKind::Timeout
    } else {
        AdapterErrorKind::Transport
    };
    AdapterError::new(provider, kind, e.to_string())
}

/// Map a non-success status to an error; `None` for 2xx.
pub(crate) fn classify_status(
    provider: ProviderKind,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> Option<AdapterError> {
    if status.is_success() {
        return None;
    }
    let kind = match status.as_u16() {
        401 | 403 => AdapterErrorKind::Authentication,
        429 => AdapterErrorKind::RateLimited { retry_after },
        code => AdapterErrorKind::Backend { status: code },
    };
    Some(AdapterError::new(
        provider,
        kind,
        format!("HTTP {}: {}", status.as_u16(), preview(body, MAX_ERROR_DETAIL)),
    ))
}

/// `Retry-After` in seconds. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_classify_status() {
        let p = ProviderKind::OpenAi;
        assert!(classify_status(p, StatusCode::OK, None, "").is_none());

        let auth = classify_status(p, StatusCode::UNAUTHORIZED, None, "bad key").unwrap();
        assert_eq!(auth.kind, AdapterErrorKind::Authentication);
        assert!(auth.detail.contains("bad key"));

        let limited = classify_status(
            p,
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(2)),
            "",
        )
        .unwrap();
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(2)));

        let server = classify_status(p, StatusCode::BAD_GATEWAY, None, "").unwrap();
        assert_eq!(server.kind, AdapterErrorKind::Backend { status: 502 });
        assert!(server.is_retryable());
    }

    #[test]
    fn test_error_detail_is_truncated() {
        let body = "x".repeat(5000);
        let err = classify_status(ProviderKind::Gemini, StatusCode::BAD_REQUEST, None, &body).unwrap();
        assert!(err.detail.len() < 400);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(reqwest::header::RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(
            reqwest::header::RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }
}
