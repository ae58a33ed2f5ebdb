//! HTTP client for the center REST endpoints.

use std::time::Duration;

use fleetrun_core::ApiResponse;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ClientError;

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client bound to one center address.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a client whose connects and requests give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body, expecting an envelope without payload.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST request");

        let response = self.inner.post(&url).json(body).send().await?;
        read_envelope::<serde_json::Value>(response, url).await?;
        Ok(())
    }

    /// POST a JSON body and decode the envelope payload.
    ///
    /// A missing payload decodes to `T::default()`.
    pub async fn post_json_with_resp<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST request");

        let response = self.inner.post(&url).json(body).send().await?;
        Ok(read_envelope(response, url).await?.unwrap_or_default())
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    url: String,
) -> Result<Option<T>, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;

    let envelope: ApiResponse<T> = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url,
            })
        }
        Err(e) => return Err(ClientError::Serialization(e.to_string())),
    };

    if envelope.is_err() {
        return Err(ClientError::Remote(envelope.err));
    }
    Ok(envelope.dat)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_post_json_with_resp_decodes_payload() {
        let router = Router::new().route(
            "/upsert",
            post(|| async {
                let mut errs = HashMap::new();
                errs.insert("1:h1".to_string(), "duplicate".to_string());
                Json(ApiResponse::ok(errs))
            }),
        );
        let client = HttpClient::new(&serve(router).await, DEFAULT_TIMEOUT).unwrap();

        let errs: HashMap<String, String> = client
            .post_json_with_resp("/upsert", &serde_json::json!([]))
            .await
            .unwrap();
        assert_eq!(errs.get("1:h1").map(String::as_str), Some("duplicate"));
    }

    #[tokio::test]
    async fn test_remote_error_is_not_transport() {
        let router = Router::new().route(
            "/done",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::<()>::error("storage unavailable")),
                )
            }),
        );
        let client = HttpClient::new(&serve(router).await, DEFAULT_TIMEOUT).unwrap();

        let err = client.post_json("/done", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::Remote(ref msg) if msg == "storage unavailable"));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_non_envelope_failure_is_transport() {
        let router = Router::new().route("/done", post(|| async { StatusCode::BAD_GATEWAY }));
        let client = HttpClient::new(&serve(router).await, DEFAULT_TIMEOUT).unwrap();

        let err = client.post_json("/done", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 502, .. }));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_trailing_slash_is_trimmed() {
        let router = Router::new().route("/done", post(|| async { Json(ApiResponse::<()>::empty()) }));
        let client = HttpClient::new(&format!("{}/", serve(router).await), DEFAULT_TIMEOUT).unwrap();

        assert!(!client.base_url().ends_with('/'));
        client.post_json("/done", &serde_json::json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        // Accepts connections and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let client = HttpClient::new(&format!("http://{addr}"), Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let err = client.post_json("/done", &serde_json::json!({})).await.unwrap_err();

        assert!(err.is_transport());
        assert!(matches!(err, ClientError::Http(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
