use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};

use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// reqwest-backed transport rooted at the API base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    http_client: Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("creating HTTP client")?;

        debug!(base_url = %base_url, timeout_secs = timeout.as_secs(), "HTTP transport initialized");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path);

        trace!(
            method = %request.method,
            url = %url,
            request_id = %request.request_id(),
            "sending API request"
        );

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(map_reqwest_error)?;

        debug!(
            status_code = %status.as_u16(),
            url = %url,
            "received API response"
        );

        Ok(ApiResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use reqwest::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn send_posts_json_with_headers() {
        let mut server = Server::new_async().await;
        let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();

        let request = ApiRequest::post("/tasks")
            .json(json!({"title": "write docs"}))
            .bearer("A1")
            .unwrap();
        let request_id = request.request_id().to_string();

        let mock = server
            .mock("POST", "/tasks")
            .match_header("Authorization", Matcher::Exact("Bearer A1".into()))
            .match_header("X-Request-Id", Matcher::Exact(request_id))
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"title": "write docs"})))
            .with_status(201)
            .with_body(r#"{"id":7}"#)
            .create_async()
            .await;

        let resp = transport.send(request).await.expect("send should succeed");
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.json::<serde_json::Value>().unwrap()["id"], 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_a_response_not_an_error() {
        let mut server = Server::new_async().await;
        let transport = HttpTransport::new(&format!("{}/", server.url()), Duration::from_secs(5)).unwrap();

        let mock = server
            .mock("GET", "/auth/self")
            .with_status(401)
            .with_body(r#"{"message":"jwt expired"}"#)
            .create_async()
            .await;

        let resp = transport.send(ApiRequest::get("auth/self")).await.unwrap();
        assert!(resp.is_unauthorized());
        assert_eq!(resp.message().as_deref(), Some("jwt expired"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = transport.send(ApiRequest::get("/auth/self")).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_) | TransportError::Timeout));
    }
}
