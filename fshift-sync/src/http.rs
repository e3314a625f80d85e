//! REST transport for the entity API.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::transport::{ApiRequest, EntityTransport, Operation};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    app_id: Option<String>,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            app_id: None,
            token: None,
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn route(&self, request: &ApiRequest) -> (Method, String) {
        let collection = format!("{}/entities/{}", self.base_url, request.entity);
        match &request.operation {
            Operation::List { .. } | Operation::Query { .. } => (Method::GET, collection),
            Operation::Get { id } => (Method::GET, format!("{collection}/{id}")),
            Operation::Create { .. } => (Method::POST, collection),
            Operation::Update { id, .. } => (Method::PUT, format!("{collection}/{id}")),
            Operation::Delete { id } => (Method::DELETE, format!("{collection}/{id}")),
            Operation::BulkCreate { .. } => (Method::POST, format!("{collection}/bulk")),
        }
    }
}

/// Map a non-success status and body to an error.
fn status_error(status: StatusCode, body: String) -> ApiError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body
    };
    ApiError::http(status.as_u16(), message)
}

#[async_trait]
impl EntityTransport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value> {
        let (method, url) = self.route(request);
        debug!(%method, %url, "http: sending");

        let mut builder = self.client.request(method, &url);
        if let Some(app_id) = &self.app_id {
            builder = builder.header("X-App-Id", app_id);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.operation {
            Operation::List { sort, limit } => {
                let mut params = Vec::new();
                if let Some(sort) = sort {
                    params.push(("sort", sort.clone()));
                }
                if let Some(limit) = limit {
                    params.push(("limit", limit.to_string()));
                }
                builder.query(&params)
            }
            Operation::Query { filter } => builder.query(&[("q", filter.to_string())]),
            Operation::Create { data } | Operation::Update { data, .. } => builder.json(data),
            Operation::BulkCreate { items } => builder.json(items),
            Operation::Get { .. } | Operation::Delete { .. } => builder,
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routes() {
        let t = HttpTransport::new("https://api.example.com/v1/");
        let (m, url) = t.route(&ApiRequest::new("Shift", Operation::List { sort: None, limit: None }));
        assert_eq!(m, Method::GET);
        assert_eq!(url, "https://api.example.com/v1/entities/Shift");

        let (m, url) = t.route(&ApiRequest::new(
            "Debt",
            Operation::Update {
                id: "d1".into(),
                data: json!({}),
            },
        ));
        assert_eq!(m, Method::PUT);
        assert_eq!(url, "https://api.example.com/v1/entities/Debt/d1");

        let (m, url) = t.route(&ApiRequest::new("Goal", Operation::BulkCreate { items: vec![] }));
        assert_eq!(m, Method::POST);
        assert_eq!(url, "https://api.example.com/v1/entities/Goal/bulk");
    }

    #[test]
    fn test_status_mapping() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, String::new());
        assert_eq!(err, ApiError::http(429, "Too Many Requests"));
        assert!(err.is_retryable());

        let err = status_error(StatusCode::NOT_FOUND, "no such shift".into());
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_retryable());
    }
}
