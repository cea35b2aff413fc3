//! Publisher backed by an HTTP relay gateway
//!
//! The gateway owns the OAuth credentials for each platform; Cadence only
//! sends it JSON and an optional bearer token. Endpoints, relative to the
//! configured base URL:
//!
//! - `POST {platform}/posts` with a [`PublishRequest`] body
//! - `POST {platform}/comments/{parent}/replies` with `{"user_id", "text"}`
//! - `GET  {platform}/comments?user_id=..&since=..`

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::PublisherConfig;
use crate::error::{ConfigError, PlatformError, Result};
use crate::platforms::{
    CommentFeed, PublishRequest, PublishedPost, PublishedReply, Publisher, ReplyRequest,
};
use crate::types::{InboundComment, Platform};

#[derive(Debug, Serialize)]
struct ReplyBody<'a> {
    user_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CommentsResponse {
    comments: Vec<GatewayComment>,
}

#[derive(Debug, Deserialize)]
struct GatewayComment {
    id: String,
    author_handle: String,
    text: String,
    timestamp: i64,
}

#[derive(Clone)]
pub struct WebhookPublisher {
    platform: Platform,
    endpoint: Url,
    token: Option<Arc<SecretString>>,
    client: Client,
}

impl WebhookPublisher {
    pub fn new(platform: Platform, endpoint: &str, token: Option<Arc<SecretString>>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("cadence/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::NotConfigured(format!("HTTP client: {}", e)))?;

        let endpoint = Url::parse(endpoint)
            .map_err(|e| PlatformError::NotConfigured(format!("gateway endpoint '{}': {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(PlatformError::NotConfigured(format!(
                "gateway endpoint '{}' is not a base URL",
                endpoint
            ))
            .into());
        }

        Ok(Self {
            platform,
            endpoint,
            token,
            client,
        })
    }

    /// One publisher per platform routed through the configured gateway
    pub fn from_config(config: &PublisherConfig) -> Result<Vec<Self>> {
        let token = match &config.token_file {
            Some(path) => Some(Arc::new(read_token_file(path)?)),
            None => None,
        };

        let platforms: Vec<Platform> = if config.platforms.is_empty() {
            Platform::ALL.to_vec()
        } else {
            config
                .platforms
                .iter()
                .map(|name| name.parse())
                .collect::<Result<_>>()?
        };

        platforms
            .into_iter()
            .map(|platform| Self::new(platform, &config.endpoint, token.clone()))
            .collect()
    }

    /// Gateway URL for `segments` under this platform; each segment is
    /// percent-encoded, so ids may contain `/`, `?` or `#`
    fn url(&self, platform: Platform, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::NotConfigured(format!("gateway endpoint '{}'", self.endpoint)))?
            .pop_if_empty()
            .push(platform.as_str())
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body).into());
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PlatformError::Posting(format!("unreadable gateway response: {}", e)).into())
    }
}

/// Read a bearer token, ignoring surrounding whitespace
pub fn read_token_file(path: &str) -> Result<SecretString> {
    let expanded = shellexpand::tilde(path).to_string();
    let token = std::fs::read_to_string(&expanded).map_err(ConfigError::ReadError)?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "publisher.token_file".to_string(),
            message: format!("{} is empty", expanded),
        }
        .into());
    }
    Ok(SecretString::from(token.to_string()))
}

fn status_error(status: StatusCode, body: &str) -> PlatformError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(detail),
        s if s.is_client_error() => PlatformError::Validation(detail),
        _ => PlatformError::Posting(detail),
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish_post(&self, request: &PublishRequest) -> Result<PublishedPost> {
        tracing::debug!(post_id = %request.post_id, platform = %self.platform, "Sending post to gateway");
        let url = self.url(self.platform, &["posts"])?;
        self.send(self.client.post(url).json(request)).await
    }

    async fn publish_reply(&self, request: &ReplyRequest) -> Result<PublishedReply> {
        let url = self.url(
            self.platform,
            &["comments", request.parent_comment_id.as_str(), "replies"],
        )?;
        let body = ReplyBody {
            user_id: &request.user_id,
            text: &request.text,
        };
        self.send(self.client.post(url).json(&body)).await
    }
}

#[async_trait]
impl CommentFeed for WebhookPublisher {
    async fn fetch_comments(
        &self,
        user_id: &str,
        platform: Platform,
        since: i64,
    ) -> Result<Vec<InboundComment>> {
        let since = since.to_string();
        let request = self
            .client
            .get(self.url(platform, &["comments"])?)
            .query(&[("user_id", user_id), ("since", since.as_str())]);

        let response: CommentsResponse = self.send(request).await?;
        Ok(response
            .comments
            .into_iter()
            .map(|c| InboundComment {
                id: c.id,
                user_id: user_id.to_string(),
                platform,
                author_handle: c.author_handle,
                text: c.text,
                timestamp: c.timestamp,
            })
            .collect())
    }
}
