//! Client for the external vehicle-information service.
//!
//! One synchronous call per registration number, no retry and no caching —
//! batching failure policy lives in the ingestion orchestrator.

use crate::model::Vehicle;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = "car-registry/0.1";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup service returned status {status}")]
    Status { status: u16 },
    #[error("failed to reach lookup service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode lookup response: {0}")]
    Decode(reqwest::Error),
}

impl LookupError {
    /// HTTP-equivalent status class threaded into the batch response. A
    /// non-2xx upstream answer keeps its own status; transport and decode
    /// failures count as internal errors.
    pub fn status_class(&self) -> u16 {
        match self {
            LookupError::Status { status } => *status,
            LookupError::Transport(_) | LookupError::Decode(_) => 500,
        }
    }
}

/// Seam for the enrichment call so tests can script responses.
#[async_trait]
pub trait LookupService: Send + Sync {
    async fn resolve(&self, reg_num: &str) -> Result<Vehicle, LookupError>;
}

#[derive(Clone)]
pub struct LookupClient {
    http: Client,
    info_url: Url,
}

impl fmt::Debug for LookupClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupClient")
            .field("info_url", &self.info_url)
            .finish_non_exhaustive()
    }
}

impl LookupClient {
    pub fn new(host: &str, timeout: Duration) -> anyhow::Result<Self> {
        let info_url = Url::parse(host)?.join("info")?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, info_url })
    }
}

#[async_trait]
impl LookupService for LookupClient {
    async fn resolve(&self, reg_num: &str) -> Result<Vehicle, LookupError> {
        let mut endpoint = self.info_url.clone();
        endpoint.query_pairs_mut().append_pair("regNum", reg_num);
        debug!(url=%endpoint, "requesting vehicle info");

        let res = self.http.get(endpoint).send().await?;
        if !res.status().is_success() {
            return Err(LookupError::Status {
                status: res.status().as_u16(),
            });
        }

        res.json::<Vehicle>().await.map_err(LookupError::Decode)
    }
}
