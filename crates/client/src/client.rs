use crate::error::{Error, Result};
use common::{
    AllocatedHost, AllocationFilters, AllocationRecord, ErrorBody, LegacyHost, ServiceContract,
};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How to reach one host-pool service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    /// Base URL of the host-pool service.
    pub url: String,
    #[serde(default)]
    pub contract: ServiceContract,
    /// Bound on every HTTP round trip; the surrounding engine imposes none.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Where key files land. Defaults to `~/.ssh`.
    #[serde(default)]
    pub key_dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ServiceSettings {
    pub fn new(url: impl Into<String>) -> Self {
        ServiceSettings {
            url: url.into(),
            contract: ServiceContract::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            key_dir: None,
        }
    }

    /// Parsed form of `url`. Empty or unparsable values are configuration
    /// errors, rejected before any network activity.
    pub(crate) fn parsed_url(&self) -> Result<Url> {
        if self.url.trim().is_empty() {
            return Err(Error::Configuration(
                "service url must not be empty".to_string(),
            ));
        }
        Url::parse(&self.url).map_err(|err| {
            Error::Configuration(format!("invalid service url '{}': {}", self.url, err))
        })
    }
}

/// HTTP client for one host-pool service, speaking whichever contract
/// generation the settings selected.
#[derive(Debug, Clone)]
pub struct HostPoolClient {
    http: reqwest::Client,
    base_url: String,
    contract: ServiceContract,
}

impl HostPoolClient {
    pub fn new(settings: &ServiceSettings) -> Result<Self> {
        settings.parsed_url()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| Error::Configuration(format!("failed to build http client: {}", err)))?;
        Ok(HostPoolClient {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            contract: settings.contract,
        })
    }

    /// Lease one host from the pool.
    pub async fn allocate(&self, filters: &AllocationFilters) -> Result<AllocationRecord> {
        let url = self.contract.allocate_url(&self.base_url);
        let mut request = self.http.post(&url);
        match self.contract {
            ServiceContract::Current => {
                request = request.json(filters);
            }
            ServiceContract::Legacy => {
                if !filters.is_empty() {
                    warn!(url = %url, "legacy allocate endpoint takes no filter body, ignoring filters");
                }
            }
        }
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(&url, err))?;
        let status = response.status();
        debug!(%status, url = %url, "allocate response received");
        if !self.contract.is_allocate_success(status.as_u16()) {
            return Err(service_error(status, response).await);
        }
        let record = match self.contract {
            ServiceContract::Legacy => response
                .json::<LegacyHost>()
                .await
                .map(AllocationRecord::from),
            ServiceContract::Current => response
                .json::<AllocatedHost>()
                .await
                .map(AllocationRecord::from),
        };
        record.map_err(|err| Error::MalformedResponse { url, source: err })
    }

    /// Return a host to the pool. Needs nothing but the id; local state is
    /// never consulted here.
    pub async fn deallocate(&self, host_id: &str) -> Result<()> {
        let url = self.contract.deallocate_url(&self.base_url, host_id);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|err| transport_error(&url, err))?;
        let status = response.status();
        debug!(%status, url = %url, "deallocate response received");
        if !self.contract.is_deallocate_success(status.as_u16()) {
            return Err(service_error(status, response).await);
        }
        Ok(())
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
            source: err,
        }
    } else {
        Error::Network {
            url: url.to_string(),
            source: err,
        }
    }
}

async fn service_error(status: StatusCode, response: Response) -> Error {
    let fallback = status.canonical_reason().unwrap_or("Unknown").to_string();
    let reason = match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|body| body.error)
            .unwrap_or(fallback),
        Err(_) => fallback,
    };
    Error::Service {
        status: status.as_u16(),
        reason,
    }
}
