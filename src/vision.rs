use crate::config::VisionConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Vision service not configured. Please set the {endpoint_env} and {key_env} environment variables.")]
    NotConfigured {
        endpoint_env: String,
        key_env: String,
    },
    #[error("Vision API timeout")]
    Timeout,
    #[error("Vision API error: {status}")]
    Status { status: u16, body: String },
    #[error("Failed to connect to vision API: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Invalid vision API response: {0}")]
    InvalidResponse(#[source] reqwest::Error),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl VisionError {
    pub fn kind(&self) -> &'static str {
        match self {
            VisionError::NotConfigured { .. } => "not_configured",
            VisionError::Timeout => "timeout",
            VisionError::Status { .. } => "status",
            VisionError::Transport(_) => "transport",
            VisionError::InvalidResponse(_) => "invalid_response",
            VisionError::ClientBuild(_) => "client_build",
        }
    }
}

/// Object detection provider.
#[async_trait]
pub trait VisionClient: Send + Sync + 'static {
    /// Runs object detection on raw image bytes and returns the provider's
    /// JSON response untouched.
    async fn analyze(&self, image_data: Bytes) -> Result<Value, VisionError>;
}

/// Client for the Azure Computer Vision `analyze` API.
///
/// Endpoint and key are looked up in the environment on every call, so a
/// service started without them only fails the detection requests.
#[derive(Debug, Clone)]
pub struct AzureVisionClient {
    client: Client,
    config: VisionConfig,
}

impl AzureVisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(config.get_timeout())
            .build()
            .map_err(VisionError::ClientBuild)?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn credentials(&self) -> Result<(String, String), VisionError> {
        let endpoint = non_empty_env(&self.config.endpoint_env);
        let key = non_empty_env(&self.config.key_env);

        match (endpoint, key) {
            (Some(endpoint), Some(key)) => Ok((endpoint, key)),
            _ => {
                tracing::error!("Vision API credentials not configured");
                Err(VisionError::NotConfigured {
                    endpoint_env: self.config.endpoint_env.clone(),
                    key_env: self.config.key_env.clone(),
                })
            }
        }
    }

    fn analyze_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            self.config.api_path.trim_start_matches('/')
        )
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn map_transport_error(err: reqwest::Error) -> VisionError {
    if err.is_timeout() {
        tracing::error!("Vision API timeout");
        VisionError::Timeout
    } else {
        tracing::error!("Vision API request error: {}", err);
        VisionError::Transport(err)
    }
}

#[async_trait]
impl VisionClient for AzureVisionClient {
    #[instrument(skip(self, image_data), fields(size = image_data.len()))]
    async fn analyze(&self, image_data: Bytes) -> Result<Value, VisionError> {
        let (endpoint, key) = self.credentials()?;
        let url = self.analyze_url(&endpoint);

        let response = self
            .client
            .post(&url)
            .query(&[("visualFeatures", self.config.visual_features.as_str())])
            .header(SUBSCRIPTION_KEY_HEADER, key)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(image_data)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Vision API error: {} - {}", status.as_u16(), body);
            return Err(VisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                map_transport_error(e)
            } else {
                tracing::error!("Vision API returned an unreadable body: {}", e);
                VisionError::InvalidResponse(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::post,
        Router,
    };
    use serde_json::json;
    use std::{collections::HashMap, time::Duration};
    use tokio::net::TcpListener;

    const ANALYZE_ROUTE: &str = "/vision/v3.2/analyze";

    async fn spawn_upstream(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Each test owns its variable names so parallel tests never see each
    /// other's credentials.
    fn client_for(test: &str, endpoint: Option<&str>, timeout_secs: u64) -> AzureVisionClient {
        let endpoint_env = format!("VISION_TEST_{}_ENDPOINT", test);
        let key_env = format!("VISION_TEST_{}_KEY", test);
        if let Some(endpoint) = endpoint {
            std::env::set_var(&endpoint_env, endpoint);
            std::env::set_var(&key_env, "secret");
        }

        let config = VisionConfig {
            endpoint_env,
            key_env,
            timeout_secs,
            ..VisionConfig::default()
        };
        AzureVisionClient::new(&config).unwrap()
    }

    async fn fake_analyze(
        Query(params): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let key = headers
            .get(SUBSCRIPTION_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if key != Some("secret") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        if params.get("visualFeatures").map(String::as_str) != Some("Objects") {
            return StatusCode::BAD_REQUEST.into_response();
        }
        Json(json!({
            "objects": [{
                "rectangle": {"x": 1, "y": 2, "w": 3, "h": 4},
                "object": "cat",
                "confidence": 0.9
            }],
            "received": body.len()
        }))
        .into_response()
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let upstream = spawn_upstream(Router::new().route(ANALYZE_ROUTE, post(fake_analyze))).await;
        let client = client_for("SUCCESS", Some(&format!("{}/", upstream)), 5);

        let response = client.analyze(Bytes::from_static(b"image-bytes")).await.unwrap();

        assert_eq!(response["received"], 11);
        assert_eq!(response["objects"][0]["object"], "cat");
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let client = client_for("MISSING", None, 5);

        let err = client.analyze(Bytes::new()).await.unwrap_err();

        assert!(matches!(err, VisionError::NotConfigured { .. }));
        assert!(err.to_string().contains("VISION_TEST_MISSING_ENDPOINT"));
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let router = Router::new().route(
            ANALYZE_ROUTE,
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "quota exceeded") }),
        );
        let upstream = spawn_upstream(router).await;
        let client = client_for("STATUS", Some(&upstream), 5);

        let err = client.analyze(Bytes::from_static(b"x")).await.unwrap_err();

        match err {
            VisionError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upstream_timeout() {
        let router = Router::new().route(
            ANALYZE_ROUTE,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"objects": []}))
            }),
        );
        let upstream = spawn_upstream(router).await;
        let client = client_for("TIMEOUT", Some(&upstream), 1);

        let err = client.analyze(Bytes::from_static(b"x")).await.unwrap_err();

        assert!(matches!(err, VisionError::Timeout), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for("REFUSED", Some(&format!("http://{}", addr)), 5);

        let err = client.analyze(Bytes::from_static(b"x")).await.unwrap_err();

        assert!(matches!(err, VisionError::Transport(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_non_json_body() {
        let router = Router::new().route(ANALYZE_ROUTE, post(|| async { "not json" }));
        let upstream = spawn_upstream(router).await;
        let client = client_for("NON_JSON", Some(&upstream), 5);

        let err = client.analyze(Bytes::from_static(b"x")).await.unwrap_err();

        assert!(matches!(err, VisionError::InvalidResponse(_)), "got {:?}", err);
    }
}
