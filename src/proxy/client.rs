//! Upstream registry client
//!
//! Forwards requests that passed the tag filter to the protected registry and
//! streams the response back. Bodies are never buffered: layer and manifest
//! uploads flow straight through.

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, ProxyResult};
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, header};
use axum::response::Response;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, instrument};

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Client for the protected registry
pub struct UpstreamClient {
    http: Client,
    base_url: String,
}

impl UpstreamClient {
    /// Create a new upstream client from configuration
    pub fn new(config: &UpstreamConfig) -> ProxyResult<Self> {
        let parsed = Url::parse(&config.url).map_err(|e| ProxyError::InvalidUpstream {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ProxyError::InvalidUpstream {
                url: config.url.clone(),
                reason: "not a base URL".to_string(),
            });
        }

        // Registries answer blob downloads with redirects to storage; the
        // client has to see those, not us.
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(ProxyError::Request)?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the upstream URL for a request path and query
    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    /// Forward a request and stream back the upstream response
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    pub async fn forward(&self, request: Request) -> ProxyResult<Response> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = self.url(path_and_query);

        let mut headers = parts.headers;
        let original_host = headers.remove(header::HOST);
        strip_hop_by_hop(&mut headers);
        if let Some(host) = original_host
            && !headers.contains_key(X_FORWARDED_HOST)
        {
            headers.insert(HeaderName::from_static(X_FORWARDED_HOST), host);
        }

        let upstream = self
            .http
            .request(parts.method, &url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await?;

        let status = upstream.status();
        debug!(%status, "Upstream responded");

        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// Remove connection-scoped headers, including any named by `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP) {
        headers.remove(name);
    }
    headers.remove(HeaderName::from_static("keep-alive"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(url: &str) -> UpstreamConfig {
        UpstreamConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = UpstreamClient::new(&config("http://registry:5000/")).unwrap();
        assert_eq!(
            client.url("/v2/app/tags/list?n=10"),
            "http://registry:5000/v2/app/tags/list?n=10"
        );
    }

    #[test]
    fn test_invalid_upstream_url() {
        assert!(matches!(
            UpstreamClient::new(&config("not a url")),
            Err(ProxyError::InvalidUpstream { .. })
        ));
        assert!(matches!(
            UpstreamClient::new(&config("mailto:ops@example.com")),
            Err(ProxyError::InvalidUpstream { .. })
        ));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("x-session"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }
}
