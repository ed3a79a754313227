//! `ActivityApi` over HTTP.
//!
//! Endpoints are resolved against the configured base URL:
//! `GET/POST {base}/activities`, `GET/PUT/DELETE {base}/activities/{id}`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use url::Url;

use crate::api::{ActivityApi, ApiError};
use crate::config::{ApiConfig, ConfigError, ValidatedUrl};
use crate::model::{ActivityId, ActivityRecord};

const ACTIVITIES_PATH: &str = "activities";

#[derive(Debug, Clone)]
pub struct HttpActivityApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    timeout_ms: u64,
}

impl HttpActivityApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let base_url = ValidatedUrl::parse(&config.base_url)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.as_url().clone(),
            token: config.token.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    /// Replaces the bearer token, e.g. after the user logs in again.
    pub fn set_token(&mut self, token: Option<SecretString>) {
        self.token = token;
    }

    pub fn endpoint(&self, id: Option<&ActivityId>) -> Url {
        let mut url = self.base_url.clone();
        // Validated http(s) URLs always have a path to extend.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(ACTIVITIES_PATH);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "activity API response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), &body))
    }

    fn transport_error(&self, e: &reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ActivityApi for HttpActivityApi {
    /// Elements that do not decode as a record are dropped with a warning;
    /// only a body that is not a JSON array fails the call.
    async fn list(&self) -> Result<Vec<ActivityRecord>, ApiError> {
        let response = self
            .send(self.request(Method::GET, self.endpoint(None)))
            .await?;
        let values: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let mut records = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<ActivityRecord>(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(index, error = %e, "skipping undecodable activity"),
            }
        }
        Ok(records)
    }

    async fn details(&self, id: &ActivityId) -> Result<ActivityRecord, ApiError> {
        let response = self
            .send(self.request(Method::GET, self.endpoint(Some(id))))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn create(&self, activity: &ActivityRecord) -> Result<(), ApiError> {
        let builder = self.request(Method::POST, self.endpoint(None)).json(activity);
        self.send(builder).await.map(|_| ())
    }

    async fn update(&self, activity: &ActivityRecord) -> Result<(), ApiError> {
        let id = ActivityId::new(activity.id.as_str());
        let builder = self
            .request(Method::PUT, self.endpoint(Some(&id)))
            .json(activity);
        self.send(builder).await.map(|_| ())
    }

    async fn delete(&self, id: &ActivityId) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, self.endpoint(Some(id))))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpActivityApi {
        HttpActivityApi::new(&ApiConfig::new(base)).unwrap()
    }

    #[test]
    fn endpoint_appends_collection() {
        let api = api("https://example.com/api");
        assert_eq!(api.endpoint(None).as_str(), "https://example.com/api/activities");
    }

    #[test]
    fn endpoint_handles_trailing_slash() {
        let api = api("https://example.com/api/");
        assert_eq!(api.endpoint(None).as_str(), "https://example.com/api/activities");
    }

    #[test]
    fn endpoint_escapes_id() {
        let api = api("https://example.com");
        let url = api.endpoint(Some(&ActivityId::new("a b/c")));
        assert_eq!(url.as_str(), "https://example.com/activities/a%20b%2Fc");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = HttpActivityApi::new(&ApiConfig::new("not a url"));
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }
}
