//! HTTP backend (PostgREST-style REST API)

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use shared::models::Collection;
use shared::query::{Filter, Query};

use super::RemoteStore;
use crate::{ClientConfig, ClientError, ClientResult};

/// HTTP client for the hosted backend
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpStore {
    /// Create a new HTTP store from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            collection.as_str()
        )
    }

    /// Attach `apikey` and bearer headers
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            return Err(map_status(status, text));
        }
        Ok(response)
    }

    async fn rows(response: reqwest::Response) -> ClientResult<Vec<Value>> {
        match response.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            other => Err(ClientError::InvalidResponse(format!(
                "expected an array of rows, got {}",
                other
            ))),
        }
    }
}

/// Map an error status to a client error
fn map_status(status: StatusCode, text: String) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::FORBIDDEN => ClientError::Forbidden(text),
        StatusCode::NOT_FOUND => ClientError::NotFound(text),
        _ => ClientError::Remote {
            status: status.as_u16(),
            message: text,
        },
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), f.to_rest_expr()))
        .collect()
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn select(&self, query: &Query) -> ClientResult<Vec<Value>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query.to_rest_params());
        let request = self
            .client
            .get(self.collection_url(query.collection))
            .query(&params);
        let response = self.send(request).await?;
        Self::rows(response).await
    }

    async fn insert(&self, collection: Collection, rows: Vec<Value>) -> ClientResult<Vec<Value>> {
        let request = self
            .client
            .post(self.collection_url(collection))
            .header("Prefer", "return=representation")
            .json(&rows);
        let response = self.send(request).await?;
        Self::rows(response).await
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> ClientResult<()> {
        let request = self
            .client
            .patch(self.collection_url(collection))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&patch);
        let response = self.send(request).await?;
        if Self::rows(response).await?.is_empty() {
            return Err(ClientError::NotFound(format!("{} {}", collection, id)));
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> ClientResult<()> {
        if filters.is_empty() {
            return Err(ClientError::InvalidRequest(format!(
                "refusing unfiltered delete on {}",
                collection
            )));
        }
        let request = self
            .client
            .delete(self.collection_url(collection))
            .query(&filter_params(filters));
        self.send(request).await?;
        Ok(())
    }
}
