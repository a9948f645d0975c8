//! "Who is online" identity feed.

use std::future::Future;
use std::time::Duration;

use crate::error::FeedError;

/// Source of the player ids currently connected to one server.
pub trait IdentityFeed: Send + Sync + 'static {
    fn connected_ids(&self) -> impl Future<Output = Result<Vec<u32>, FeedError>> + Send;
}

/// Feed served over HTTP as a JSON array of player ids.
#[derive(Debug, Clone)]
pub struct HttpIdentityFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpIdentityFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl IdentityFeed for HttpIdentityFeed {
    async fn connected_ids(&self) -> Result<Vec<u32>, FeedError> {
        let request_error = |source| FeedError::Request {
            url: self.url.clone(),
            source,
        };
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(request_error)?
            .bytes()
            .await
            .map_err(request_error)?;
        Ok(serde_json::from_slice(&body)?)
    }
}
