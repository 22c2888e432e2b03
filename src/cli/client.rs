use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::auth::{generate_jwt, Claims};
use crate::config::config;

/// Thin HTTP client for the tenancy API's JSON envelopes
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            http: reqwest::Client::new(),
        }
    }

    /// `TENANCY_API_URL` (default: localhost on the configured port) and
    /// `TENANCY_ROOT_TOKEN`. Without a token one is minted from
    /// `SECURITY_JWT_SECRET` when that is set.
    pub fn from_env() -> anyhow::Result<Self> {
        let app = config();
        let base_url = std::env::var("TENANCY_API_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", app.api.port));

        let token = match std::env::var("TENANCY_ROOT_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Some(token),
            _ if !app.security.jwt_secret.is_empty() => Some(generate_jwt(
                &Claims::root("tenancy-cli", app.security.jwt_expiry_hours),
                &app.security.jwt_secret,
            )?),
            _ => None,
        };

        Ok(Self::new(base_url, token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> anyhow::Result<Value> {
        self.request(Method::POST, path, body).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn put(&self, path: &str) -> anyhow::Result<Value> {
        self.request(Method::PUT, path, None).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        self.request(Method::DELETE, path, None).await
    }

    /// Returns the envelope's `data`; error envelopes become errors carrying
    /// the server's message and code.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .timeout(Duration::from_secs(10));

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(payload.get("data").cloned().unwrap_or(payload));
        }

        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"));
        let code = payload.get("code").and_then(Value::as_str).unwrap_or("");

        if status == StatusCode::UNAUTHORIZED && self.token.is_none() {
            anyhow::bail!("{} (set TENANCY_ROOT_TOKEN or SECURITY_JWT_SECRET)", message);
        }
        anyhow::bail!("{} {}: {}", status.as_u16(), code, message)
    }
}
