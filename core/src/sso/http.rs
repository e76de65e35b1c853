use reqwest::header::{CACHE_CONTROL, PRAGMA};
use url::Url;

use super::{RedirectPayload, TokenSource};
use crate::error::SsoError;

/// Default path of the redirect-token route on the site itself.
pub const DEFAULT_TOKEN_PATH: &str = "/ssoout";

/// Fetches redirect payloads from the site's token endpoint over HTTP.
///
/// `GET {endpoint}?destinationUrl=<link href>&_=<epoch ms>`; the body of a
/// 2xx response is the payload.
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTokenSource {
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    /// Token endpoint at [`DEFAULT_TOKEN_PATH`] on `site`.
    pub fn for_site(client: reqwest::Client, site: &Url) -> Result<Self, url::ParseError> {
        Ok(Self::with_client(client, site.join(DEFAULT_TOKEN_PATH)?))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_url(&self, destination: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("destinationUrl", destination)
            // cache buster, payloads are minted per click
            .append_pair("_", &chrono::Utc::now().timestamp_millis().to_string());
        url
    }
}

impl TokenSource for HttpTokenSource {
    async fn fetch_payload(&self, destination: &str) -> Result<RedirectPayload, SsoError> {
        let url = self.request_url(destination);
        tracing::debug!(endpoint = %self.endpoint, "requesting SSO redirect payload");

        let resp = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "token endpoint returned non-success status");
            return Err(SsoError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        RedirectPayload::new(body)
    }
}
