use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use provisio_core::ProvisionError;

/// Retrieves the raw bytes behind a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProvisionError>;
}

/// Client behavior for operator-supplied URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    /// Branding assets are often served from self-signed internal hosts.
    pub accept_invalid_certs: bool,
    pub send_referer: bool,
    /// A 3xx response is returned as a fetch error instead of being followed.
    pub follow_redirects: bool,
}

impl FetchPolicy {
    pub fn operator_urls(timeout: Duration) -> Self {
        Self {
            timeout,
            accept_invalid_certs: true,
            send_referer: false,
            follow_redirects: false,
        }
    }

    fn redirect(&self) -> reqwest::redirect::Policy {
        if self.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        }
    }
}

/// HTTP/1.1 fetcher built from a [`FetchPolicy`].
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: FetchPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ProvisionError> {
        Self::with_policy(FetchPolicy::operator_urls(timeout))
    }

    pub fn with_policy(policy: FetchPolicy) -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(policy.accept_invalid_certs)
            .referer(policy.send_referer)
            .redirect(policy.redirect())
            .http1_only()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| ProvisionError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProvisionError> {
        let fail = |reason: String| ProvisionError::Fetch {
            url: url.to_string(),
            reason,
        };
        info!(url, "Fetching URL");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }
        let body = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        Ok(body.to_vec())
    }
}
