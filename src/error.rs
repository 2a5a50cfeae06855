// src/error.rs
use thiserror::Error;

/// Conditions that abort a replay session once it has started.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("exceeded number of packets in cache file ({capacity})")]
    CacheExhausted { capacity: usize },
    #[error("write to {iface} failed: {source}")]
    Transmit {
        iface: String,
        #[source]
        source: std::io::Error,
    },
}
