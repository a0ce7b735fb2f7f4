//! HTTP polling implementation of the secondary transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{PollTransport, TransportError};
use crate::objects::PollResponse;

/// Polls `GET /api/v1/users/{user_id}/notifications?after=...`.
#[derive(Debug, Clone)]
pub struct HttpPollTransport {
    http: Client,
    base_url: Url,
}

impl HttpPollTransport {
    /// Build a transport whose requests give up after `request_timeout`.
    pub fn new(base_url: Url, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    fn poll_url(&self, user_id: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(&format!(
            "/api/v1/users/{}/notifications",
            urlencoding::encode(user_id)
        ))?)
    }
}

#[async_trait]
impl PollTransport for HttpPollTransport {
    async fn poll(
        &self,
        user_id: &str,
        cursor: Option<u64>,
    ) -> Result<PollResponse, TransportError> {
        let url = self.poll_url(user_id)?;

        let mut request = self.http.get(url);
        if let Some(cursor) = cursor {
            request = request.query(&[("after", cursor)]);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(resp.json().await?)
    }
}
