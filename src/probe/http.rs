use super::{Probe, ProbeResponse};
use crate::config::ProbeConfig;
use crate::{Error, Result};
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::debug;

/// HTTP GET probe against a backend endpoint
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    expected_status: Option<StatusCode>,
}

impl HttpProbe {
    /// Create a new HTTP probe
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(5),
            expected_status: None,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        let mut probe = Self::new(&config.url).with_timeout(config.timeout());
        if let Some(code) = config.expected_status {
            let status = StatusCode::from_u16(code)
                .map_err(|e| Error::invalid("expected_status", e.to_string()))?;
            probe = probe.with_expected_status(status);
        }
        Ok(probe)
    }

    /// Set the per-request deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Require an exact status code; otherwise any 2xx counts as success
    #[must_use]
    pub const fn with_expected_status(mut self, status: StatusCode) -> Self {
        self.expected_status = Some(status);
        self
    }

    fn map_send_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout {
                timeout: self.timeout,
            }
        } else {
            Error::Http(error)
        }
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn probe(&self) -> Result<ProbeResponse> {
        let start_time = Instant::now();

        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let latency = start_time.elapsed();
        let status = response.status();
        debug!("Probe {} answered {} in {:?}", self.url, status, latency);

        let accepted = self
            .expected_status
            .map_or_else(|| status.is_success(), |expected| status == expected);
        if !accepted {
            return Err(Error::network(format!(
                "unexpected status {status} from {}",
                self.url
            )));
        }

        Ok(ProbeResponse::new(Some(status.as_u16()), latency))
    }

    fn target(&self) -> &str {
        &self.url
    }
}
