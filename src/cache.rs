// src/cache.rs
use crate::error::ReplayError;
use anyhow::Context;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Precomputed per-packet output decisions, one bit per frame. Bit `n` of the
/// stream is bit `n % 8` (least significant first) of byte `n / 8`; a set bit
/// sends the frame out the primary interface.
#[derive(Debug, Clone)]
pub struct RoutingCache {
    data: Arc<[u8]>,
    packets: usize,
}

impl RoutingCache {
    pub fn new(data: Vec<u8>, packets: usize) -> anyhow::Result<Self> {
        if packets > data.len() * 8 {
            anyhow::bail!("cache claims {} packets but holds only {} bits", packets, data.len() * 8);
        }
        Ok(Self { data: data.into(), packets })
    }

    pub fn from_file(p: &Path) -> anyhow::Result<Self> {
        let data = fs::read(p).with_context(|| format!("read cache file {:?}", p))?;
        if data.is_empty() {
            anyhow::bail!("cache file {:?} is empty", p);
        }
        let packets = data.len() * 8;
        Self::new(data, packets)
    }

    #[inline]
    pub fn packets(&self) -> usize { self.packets }

    pub fn cursor(&self) -> RoutingCursor {
        RoutingCursor { cache: self.clone(), byte: 0, bit: 0, used: 0 }
    }
}

/// Read position in a [`RoutingCache`]. Reset at the start of every input
/// file so each pass replays the same decision pattern.
#[derive(Debug, Clone)]
pub struct RoutingCursor {
    cache: RoutingCache,
    byte: usize,
    bit: u8,
    used: usize,
}

impl RoutingCursor {
    pub fn reset(&mut self) {
        self.byte = 0;
        self.bit = 0;
        self.used = 0;
    }

    #[inline]
    pub fn position(&self) -> (usize, u8) { (self.byte, self.bit) }

    /// Decision for the next frame; advances by one bit.
    pub fn next_is_primary(&mut self) -> Result<bool, ReplayError> {
        if self.used >= self.cache.packets {
            return Err(ReplayError::CacheExhausted { capacity: self.cache.packets });
        }
        let primary = self.cache.data[self.byte] & (1u8 << self.bit) != 0;
        if self.bit == 7 {
            self.bit = 0;
            self.byte += 1;
        } else {
            self.bit += 1;
        }
        self.used += 1;
        Ok(primary)
    }
}
