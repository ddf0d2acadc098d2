use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    /// Targets that are not absolute URIs are resolved against it
    pub base_url: Option<String>,

    /// Largest slice written to a download sink, or read from an upload
    /// source, between two progress reports and cancellation checks
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            chunk_size: default_chunk_size(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }
}

fn default_chunk_size() -> usize {
    64 * 1024
}
