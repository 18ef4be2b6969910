//! Snapshot loader

use chrono::{DateTime, SecondsFormat, Utc};
use muster_api::{ReplicatedEntity, SINCE_PARAM};
use reqwest::Client;
use tracing::{info, warn};

use crate::error::ReplicationError;
use crate::options::ReplicationOptions;

/// Fetches `GET {base_url}{snapshot_path}`, retrying transient failures
/// `snapshot_retries` times with a fixed delay.
#[derive(Clone)]
pub struct SnapshotLoader {
    client: Client,
    options: ReplicationOptions,
}

impl SnapshotLoader {
    pub fn new(options: ReplicationOptions) -> Result<Self, ReplicationError> {
        let client = Client::builder()
            .connect_timeout(options.request_timeout())
            .timeout(options.request_timeout())
            .build()?;
        Ok(Self { client, options })
    }

    /// Full snapshot, or only records updated after `since`.
    pub async fn load(
        &self,
        base_url: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReplicatedEntity>, ReplicationError> {
        let attempts = self.options.snapshot_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            match self.fetch(base_url, since).await {
                Ok(entities) => {
                    info!(
                        source = %base_url,
                        entities = entities.len(),
                        incremental = since.is_some(),
                        "Snapshot loaded"
                    );
                    return Ok(entities);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        source = %base_url,
                        attempt,
                        "Snapshot fetch failed, retrying in {}ms: {}",
                        self.options.retry_delay_ms,
                        e
                    );
                    tokio::time::sleep(self.options.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch(
        &self,
        base_url: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReplicatedEntity>, ReplicationError> {
        let url = format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            self.options.snapshot_path
        );

        let mut request = self.client.get(&url);
        if let Some(since) = since {
            request = request.query(&[(SINCE_PARAM, since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReplicationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Vec<ReplicatedEntity>>().await?)
    }
}
