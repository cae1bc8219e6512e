//! one-shot fetch of the upstream's cached readings (GET /cache)

use crate::domain::CacheSnapshot;
use crate::error::{DashboardError, DashboardResult};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Clone)]
pub struct SnapshotClient {
    http: reqwest::Client,
    url: Url,
}

impl SnapshotClient {
    pub fn new(base_url: &Url, timeout: Duration) -> DashboardResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: cache_url(base_url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// fetch and validate; any http, decode or shape failure is an error
    pub async fn fetch(&self) -> DashboardResult<CacheSnapshot> {
        debug!(url = %self.url, "fetching snapshot");
        let body: Value = self
            .http
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let snapshot = CacheSnapshot::from_value(body)?;
        if snapshot.dropped_samples > 0 {
            warn!(
                dropped = snapshot.dropped_samples,
                "snapshot contained malformed samples"
            );
        }
        Ok(snapshot)
    }
}

/// `{base}/cache`, keeping any path prefix on the base
pub fn cache_url(base_url: &Url) -> DashboardResult<Url> {
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(DashboardError::InvalidUrl(format!(
            "snapshot endpoint needs http(s), got {base_url}"
        )));
    }
    let mut url = base_url.clone();
    let path = format!("{}/cache", base_url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_url() {
        let base = Url::parse("http://localhost:5000").unwrap();
        assert_eq!(cache_url(&base).unwrap().as_str(), "http://localhost:5000/cache");

        let base = Url::parse("https://sensors.example.com/edge/?x=1").unwrap();
        assert_eq!(
            cache_url(&base).unwrap().as_str(),
            "https://sensors.example.com/edge/cache"
        );
    }

    #[test]
    fn test_cache_url_rejects_ws() {
        let base = Url::parse("ws://localhost:5000").unwrap();
        assert!(cache_url(&base).is_err());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_error() {
        let client = SnapshotClient::new(
            &Url::parse("http://127.0.0.1:9").unwrap(),
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(matches!(
            client.fetch().await,
            Err(DashboardError::SnapshotHttp(_))
        ));
    }
}
