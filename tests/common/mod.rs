#![allow(dead_code)]

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use tenancy_api_rust::auth::{generate_jwt, Claims};
use tenancy_api_rust::config::AppConfig;
use tenancy_api_rust::tenancy::{ResourceKind, TenantRecord, TenantStatus};
use tenancy_api_rust::{router, AppState};

pub const JWT_SECRET: &str = "test-secret";
pub const BASE_DOMAIN: &str = "example.com";

/// acme: active, jobs capped at 5 and users at 3, custom domain portal.acme.test
/// globex: active, job-posting only, no limits
/// initech: suspended, every feature enabled
pub fn fixtures() -> Vec<TenantRecord> {
    vec![
        TenantRecord::new("acme", "Acme Corp")
            .with_domain("portal.acme.test")
            .with_feature("job-posting")
            .with_feature("polls")
            .with_feature("groups")
            .with_feature("analytics")
            .with_limit(ResourceKind::Jobs, 5)
            .with_limit(ResourceKind::Users, 3),
        TenantRecord::new("globex", "Globex").with_feature("job-posting"),
        TenantRecord::new("initech", "Initech")
            .with_status(TenantStatus::Suspended)
            .with_feature("job-posting")
            .with_feature("analytics"),
    ]
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.tenancy.base_domains = vec![BASE_DOMAIN.to_string()];
    config.tenancy.default_tenant = None;
    config.tenancy.trust_tenant_header = true;
    config.tenancy.path_resolution = true;
    config.api.enable_request_logging = false;
    config.security.jwt_secret = JWT_SECRET.to_string();
    config.security.enable_audit_logging = true;
    config
}

pub fn host(slug: &str) -> String {
    format!("{}.{}", slug, BASE_DOMAIN)
}

pub fn root_token() -> String {
    generate_jwt(&Claims::root("test-operator", 1), JWT_SECRET).expect("root token")
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(test_config(), fixtures())
    }

    pub fn with(config: AppConfig, tenants: Vec<TenantRecord>) -> Self {
        let state = AppState::in_memory(config, tenants).expect("valid fixtures");
        let router = router(state.clone());
        Self { state, router }
    }

    pub fn call(&self, method: Method, uri: &str) -> Call<'_> {
        Call {
            app: self,
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(&self, uri: &str) -> Call<'_> {
        self.call(Method::GET, uri)
    }

    pub fn post(&self, uri: &str) -> Call<'_> {
        self.call(Method::POST, uri)
    }

    pub fn delete(&self, uri: &str) -> Call<'_> {
        self.call(Method::DELETE, uri)
    }

    /// Creates a record through the API as the given tenant
    pub async fn create(&self, slug: &str, resource: &str, body: Value) -> Result<Reply> {
        self.post(&format!("/api/data/{}", resource))
            .host(&host(slug))
            .json(body)
            .send()
            .await
    }
}

pub struct Call<'a> {
    app: &'a TestApp,
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl<'a> Call<'a> {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn host(self, host: &str) -> Self {
        self.header("host", host)
    }

    pub fn tenant(self, value: &str) -> Self {
        self.header("x-tenant-id", value)
    }

    pub fn root(self) -> Self {
        let token = root_token();
        self.header("authorization", &format!("Bearer {}", token))
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub async fn send(self) -> Result<Reply> {
        let mut builder = Request::builder().method(self.method).uri(&self.uri);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let request = match self.body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body from {}", self.uri))?
        };

        Ok(Reply { status, body })
    }
}

#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn code(&self) -> Option<&str> {
        self.body["code"].as_str()
    }

    /// Slug of the tenant that served a tenant-scoped response
    pub fn tenant_slug(&self) -> Option<&str> {
        self.body["tenant"]["slug"].as_str()
    }

    pub fn resolved_from(&self) -> Option<&str> {
        self.body["tenant"]["resolved_from"].as_str()
    }
}

/// A real server on an unused port, for tests that go over the network
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
}

impl TestServer {
    pub async fn spawn(state: AppState) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test port")?;
        let app = router(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self { port, base_url };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == reqwest::StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}
