use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ambient network metadata captured alongside each probe cycle.
/// The diagnostics loop never interprets these values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeMetadata {
    pub signal_strength_dbm: Option<i32>,
    pub network_type: Option<String>,
    pub network_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ProbeMetadata {
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Supplies a metadata snapshot at the start of every probe cycle
pub trait MetadataSource: Send + Sync {
    fn snapshot(&self) -> ProbeMetadata;
}

impl<F> MetadataSource for F
where
    F: Fn() -> ProbeMetadata + Send + Sync,
{
    fn snapshot(&self) -> ProbeMetadata {
        self()
    }
}

/// Returns the same metadata every time
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata(pub ProbeMetadata);

impl MetadataSource for StaticMetadata {
    fn snapshot(&self) -> ProbeMetadata {
        self.0.clone()
    }
}
