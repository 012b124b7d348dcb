//! # Probes
//!
//! A probe is one network health-check call. The diagnostics loop only
//! depends on the [`Probe`] trait; failures must come back as
//! [`Error::Timeout`](crate::Error::Timeout) when the probe's own deadline
//! elapses so the retry executor can tell transient failures apart.

pub mod http;
pub mod metadata;

use crate::resilience::TimeoutExt;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

pub use http::HttpProbe;
pub use metadata::{MetadataSource, ProbeMetadata, StaticMetadata};

/// Successful probe response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// Protocol status code, when the probe has one
    pub status: Option<u16>,
    /// Latency of the single successful attempt
    pub latency: Duration,
}

impl ProbeResponse {
    #[must_use]
    pub const fn new(status: Option<u16>, latency: Duration) -> Self {
        Self { status, latency }
    }
}

/// A network operation the diagnostics loop can run repeatedly
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> Result<ProbeResponse>;

    /// Short description for log records
    fn target(&self) -> &str;
}

/// Adapts an async closure into a [`Probe`]
pub struct FnProbe<F> {
    target: String,
    operation: F,
    deadline: Option<Duration>,
}

impl<F> FnProbe<F> {
    pub fn new(target: impl Into<String>, operation: F) -> Self {
        Self {
            target: target.into(),
            operation,
            deadline: None,
        }
    }

    /// Fail attempts with a timeout once `deadline` elapses
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[async_trait::async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProbeResponse>> + Send + 'static,
{
    async fn probe(&self) -> Result<ProbeResponse> {
        let call = (self.operation)();
        match self.deadline {
            Some(deadline) => call.with_deadline(deadline).await,
            None => call.await,
        }
    }

    fn target(&self) -> &str {
        &self.target
    }
}
