use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use risk_gate::CandidatePick;
use serde_json::Value;

use crate::cache::TtlCache;

/// Produces the ranked candidate list for a run.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// `force_refresh` asks the source to bypass any cached scan.
    async fn scan(&self, force_refresh: bool) -> Result<Vec<CandidatePick>>;
}

/// Accepts a bare array of picks or an object with a `picks` array. Picks are
/// decoded one at a time; a malformed entry is dropped with a warning.
fn parse_scan(body: &str) -> Result<Vec<CandidatePick>> {
    let payload: Value = serde_json::from_str(body).context("scan response is not JSON")?;
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("picks") {
            Some(Value::Array(entries)) => entries,
            _ => anyhow::bail!("scan response has no picks array"),
        },
        _ => anyhow::bail!("scan response is not a list of picks"),
    };

    let total = entries.len();
    let picks: Vec<CandidatePick> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(pick) => Some(pick),
            Err(e) => {
                tracing::warn!("Dropping malformed scan entry #{}: {}", index, e);
                None
            }
        })
        .collect();

    if picks.len() < total {
        tracing::warn!("Scan had {} entries, {} usable", total, picks.len());
    }
    Ok(picks)
}

/// Scanner reached over HTTP: `GET {url}?refresh=<bool>`.
pub struct HttpSignalSource {
    client: Client,
    url: String,
}

impl HttpSignalSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build signal source HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SignalSource for HttpSignalSource {
    async fn scan(&self, force_refresh: bool) -> Result<Vec<CandidatePick>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("refresh", force_refresh)])
            .send()
            .await
            .with_context(|| format!("signal source {} unreachable", self.url))?;

        let status = response.status();
        let body = response.text().await.context("failed to read scan response")?;
        if !status.is_success() {
            anyhow::bail!("signal source returned {}: {}", status, body);
        }

        let picks = parse_scan(&body)?;
        tracing::info!("Signal source returned {} candidates", picks.len());
        Ok(picks)
    }
}

/// Wraps a source with a TTL cache; `force_refresh` bypasses and repopulates.
pub struct CachedSignalSource<S> {
    inner: S,
    cache: TtlCache<Vec<CandidatePick>>,
}

impl<S: SignalSource> CachedSignalSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }
}

#[async_trait]
impl<S: SignalSource> SignalSource for CachedSignalSource<S> {
    async fn scan(&self, force_refresh: bool) -> Result<Vec<CandidatePick>> {
        self.cache
            .get_or_refresh(force_refresh, || self.inner.scan(force_refresh))
            .await
    }
}
