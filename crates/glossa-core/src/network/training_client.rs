//! HTTP client for the remote training service.

use super::retry::{retry_async, RetryPolicy};
use crate::config::{AppConfig, NetworkConfig};
use crate::error::{GlossaError, Result};
use crate::models::{ListModelsOptions, TrainedModel, TrainingCredentials};
use crate::stores::TrainingService;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<TrainedModel>,
}

/// Training service client over its REST API.
pub struct HttpTrainingService {
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpTrainingService {
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(AppConfig::USER_AGENT)
            .build()
            .map_err(|e| GlossaError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            timeout,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn models_url(credentials: &TrainingCredentials) -> Result<String> {
        let base = credentials.url.trim_end_matches('/');
        if base.is_empty() {
            return Err(GlossaError::Config {
                message: "training service URL is empty".to_string(),
            });
        }
        Ok(format!("{}/{}", base, NetworkConfig::MODELS_PATH))
    }

    fn authorize(request: RequestBuilder, credentials: &TrainingCredentials) -> RequestBuilder {
        if credentials.api_key.is_empty() {
            request
        } else {
            request.basic_auth("apikey", Some(&credentials.api_key))
        }
    }

    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GlossaError::Network {
            message: format!("{} returned {}: {}", what, status, body),
            status_code: Some(status.as_u16()),
        })
    }
}

/// Map a transport failure, reporting timeouts with the configured limit.
fn transport_error(err: reqwest::Error, timeout: Duration) -> GlossaError {
    if err.is_timeout() {
        GlossaError::Timeout(timeout)
    } else {
        err.into()
    }
}

/// Parse a model listing and drop stock models unless requested.
fn parse_models(body: &str, options: ListModelsOptions) -> Result<Vec<TrainedModel>> {
    let parsed: ModelsResponse = serde_json::from_str(body)?;
    Ok(parsed
        .models
        .into_iter()
        .filter(|m| options.include_default || m.is_customizable())
        .collect())
}

#[async_trait]
impl TrainingService for HttpTrainingService {
    async fn get_models(
        &self,
        credentials: &TrainingCredentials,
        options: ListModelsOptions,
    ) -> Result<Vec<TrainedModel>> {
        let url = Self::models_url(credentials)?;
        let default = if options.include_default { "true" } else { "false" };
        let timeout = self.timeout;

        let body = retry_async(&self.retry, "list trained models", || {
            let request = self
                .client
                .get(&url)
                .query(&[("version", NetworkConfig::API_VERSION), ("default", default)]);
            let request = Self::authorize(request, credentials);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| transport_error(e, timeout))?;
                let response = Self::check(response, "GET models").await?;
                response.text().await.map_err(|e| transport_error(e, timeout))
            }
        })
        .await?;

        let models = parse_models(&body, options)?;
        debug!("Training service listed {} models", models.len());
        Ok(models)
    }

    async fn delete_model(&self, credentials: &TrainingCredentials, model_id: &str) -> Result<()> {
        let url = format!("{}/{}", Self::models_url(credentials)?, model_id);
        let timeout = self.timeout;

        retry_async(&self.retry, "delete trained model", || {
            let request = self
                .client
                .delete(&url)
                .query(&[("version", NetworkConfig::API_VERSION)]);
            let request = Self::authorize(request, credentials);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| transport_error(e, timeout))?;
                if response.status() == StatusCode::NOT_FOUND {
                    debug!("Trained model {} already absent", model_id);
                    return Ok(());
                }
                Self::check(response, "DELETE model").await?;
                Ok::<(), GlossaError>(())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_models_filters_stock() {
        let body = r#"{
            "models": [
                {"model_id": "en-fr", "source": "en", "target": "fr", "base_model_id": "", "status": "available"},
                {"model_id": "c-1", "name": "news", "source": "en", "target": "fr",
                 "base_model_id": "en-fr", "domain": "news", "status": "available"}
            ]
        }"#;

        let custom = parse_models(body, ListModelsOptions::default()).unwrap();
        assert_eq!(custom.len(), 1);
        assert_eq!(custom[0].model_id, "c-1");
        assert_eq!(custom[0].name, "news");

        let all = parse_models(body, ListModelsOptions { include_default: true }).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_parse_models_tolerates_missing_list() {
        assert!(parse_models("{}", ListModelsOptions::default()).unwrap().is_empty());
        assert!(parse_models("not json", ListModelsOptions::default()).is_err());
    }

    #[test]
    fn test_models_url() {
        let creds = TrainingCredentials::new("https://lt.example.com/api/", "k");
        assert_eq!(
            HttpTrainingService::models_url(&creds).unwrap(),
            "https://lt.example.com/api/v3/models"
        );
        assert!(HttpTrainingService::models_url(&TrainingCredentials::default()).is_err());
    }

    #[tokio::test]
    async fn test_timeout_reports_configured_limit() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let limit = Duration::from_millis(200);
        let service = HttpTrainingService::with_timeout(limit)
            .unwrap()
            .with_retry(RetryPolicy::none());
        let creds = TrainingCredentials::new(format!("http://{}", addr), "k");
        let err = service
            .get_models(&creds, ListModelsOptions::default())
            .await
            .unwrap_err();
        hold.abort();

        assert!(matches!(err, GlossaError::Timeout(d) if d == limit), "{err:?}");
        assert!(err.to_string().contains("200ms"));
    }
}
