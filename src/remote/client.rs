// ABOUTME: HTTP client for the media API's changedAssets GraphQL query
// ABOUTME: Implements ChangeFeed and maps transport/payload problems to FeedError

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::models::{
    ChangedAssetsData, ChangedAssetsVariables, GraphQlRequest, GraphQlResponse,
    CHANGED_ASSETS_QUERY,
};
use crate::changes::{ChangeBatch, ChangeFeed, Checkpoint, FeedError};
use crate::config::FeedConfig;

pub struct GraphQlChangeFeed {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GraphQlChangeFeed {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            api_key: config.api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChangeFeed for GraphQlChangeFeed {
    async fn poll(&self, since: Checkpoint) -> Result<ChangeBatch, FeedError> {
        let body = GraphQlRequest {
            query: CHANGED_ASSETS_QUERY,
            variables: ChangedAssetsVariables {
                since: since.value(),
            },
        };

        let mut request = self.client.post(&self.endpoint).json(&body);

        // Add API key header if provided
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FeedError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        parse_changed_assets(&text)
    }
}

/// Decode a changedAssets response body.
///
/// Anything short of a complete batch discards the whole response; GraphQL
/// errors fail the cycle even when partial data came along.
pub fn parse_changed_assets(body: &str) -> Result<ChangeBatch, FeedError> {
    let response: GraphQlResponse<ChangedAssetsData> =
        serde_json::from_str(body).map_err(|e| FeedError::Malformed(e.to_string()))?;

    if !response.errors.is_empty() {
        return Err(FeedError::Query(
            response.errors.into_iter().map(|e| e.message).collect(),
        ));
    }

    response
        .data
        .and_then(|data| data.changed_assets)
        .ok_or_else(|| FeedError::Malformed("response has no changedAssets".to_string()))
}
