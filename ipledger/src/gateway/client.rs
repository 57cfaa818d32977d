//! HTTP client bound to a single upstream service

use std::time::Duration;

use http::HeaderMap;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

/// Thin reqwest wrapper for one upstream service.
///
/// One instance per upstream, built at startup and shared by the proxy
/// handlers. Every request asks for JSON and forwards the caller's
/// `Authorization` header when present, so the upstream authenticates the
/// original user rather than the gateway.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ServiceClient {
    /// Build a client for `base_url` with a per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let base_url: String = base_url.into();
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET `path` (which may carry a query string) on the upstream.
    pub async fn get(&self, path: &str, headers: &HeaderMap) -> reqwest::Result<reqwest::Response> {
        self.request(Method::GET, path, headers).send().await
    }

    /// POST a JSON `body` to `path`.
    pub async fn post(
        &self,
        path: &str,
        headers: &HeaderMap,
        body: &Value,
    ) -> reqwest::Result<reqwest::Response> {
        self.request(Method::POST, path, headers)
            .json(body)
            .send()
            .await
    }

    /// PUT a JSON `body` to `path`.
    pub async fn put(
        &self,
        path: &str,
        headers: &HeaderMap,
        body: &Value,
    ) -> reqwest::Result<reqwest::Response> {
        self.request(Method::PUT, path, headers)
            .json(body)
            .send()
            .await
    }

    /// PATCH a JSON `body` to `path`.
    pub async fn patch(
        &self,
        path: &str,
        headers: &HeaderMap,
        body: &Value,
    ) -> reqwest::Result<reqwest::Response> {
        self.request(Method::PATCH, path, headers)
            .json(body)
            .send()
            .await
    }

    /// DELETE `path` on the upstream.
    pub async fn delete(
        &self,
        path: &str,
        headers: &HeaderMap,
    ) -> reqwest::Result<reqwest::Response> {
        self.request(Method::DELETE, path, headers).send().await
    }

    fn request(&self, method: Method, path: &str, headers: &HeaderMap) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");

        if let Some(auth) = headers.get(AUTHORIZATION) {
            builder = builder.header(AUTHORIZATION, auth.clone());
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ServiceClient {
        ServiceClient::new("http://auth-service:8081/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn trailing_slashes_do_not_double_up() {
        let request = client()
            .request(Method::GET, "/v1/users", &HeaderMap::new())
            .build()
            .unwrap();

        assert_eq!(request.url().as_str(), "http://auth-service:8081/v1/users");
    }

    #[test]
    fn query_strings_survive_the_join() {
        let request = client()
            .request(Method::GET, "v1/audit-logs?page=2&per_page=50", &HeaderMap::new())
            .build()
            .unwrap();

        assert_eq!(request.url().path(), "/v1/audit-logs");
        assert_eq!(request.url().query(), Some("page=2&per_page=50"));
    }

    #[test]
    fn authorization_header_is_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer token-123".parse().unwrap());

        let request = client()
            .request(Method::DELETE, "/v1/logout", &headers)
            .build()
            .unwrap();

        assert_eq!(
            request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer token-123")
        );
    }

    #[test]
    fn requests_without_authorization_stay_anonymous() {
        let request = client()
            .request(Method::GET, "/v1/users", &HeaderMap::new())
            .build()
            .unwrap();

        assert!(request.headers().get(AUTHORIZATION).is_none());
        assert_eq!(
            request.headers().get(ACCEPT).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[test]
    fn json_bodies_are_tagged_as_json() {
        let request = client()
            .request(Method::POST, "/v1/login", &HeaderMap::new())
            .json(&serde_json::json!({ "email": "ops@example.com" }))
            .build()
            .unwrap();

        assert_eq!(
            request
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }
}
