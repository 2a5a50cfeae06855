// src/classify.rs
use crate::cache::RoutingCursor;
use crate::cidr::CidrTable;
use crate::config::{MacAddr, SessionConfig, SplitMode};
use crate::error::ReplayError;
use crate::headers;
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Primary,
    Secondary,
}

impl Port {
    pub fn as_str(self) -> &'static str {
        match self {
            Port::Primary => "primary",
            Port::Secondary => "secondary",
        }
    }
}

enum Rule {
    Single,
    Cache(RoutingCursor),
    Cidr(CidrTable),
}

/// Picks the output interface for each frame and rewrites the destination
/// MAC when an override is configured for that side.
pub struct OutputClassifier {
    rule: Rule,
    primary_mac: Option<MacAddr>,
    secondary_mac: Option<MacAddr>,
}

impl OutputClassifier {
    pub fn new(cfg: &SessionConfig) -> Self {
        let rule = match &cfg.split {
            SplitMode::Single => Rule::Single,
            SplitMode::Cache(cache) => Rule::Cache(cache.cursor()),
            SplitMode::Cidr(table) => Rule::Cidr(table.clone()),
        };
        Self { rule, primary_mac: cfg.primary_mac, secondary_mac: cfg.secondary_mac }
    }

    /// Called at the start of every input file.
    pub fn reset(&mut self) {
        if let Rule::Cache(cursor) = &mut self.rule {
            trace!("rewinding routing cache from {:?}", cursor.position());
            cursor.reset();
        }
    }

    pub fn classify(&mut self, frame: &mut [u8]) -> Result<Port, ReplayError> {
        let port = match &mut self.rule {
            Rule::Single => Port::Primary,
            Rule::Cache(cursor) => {
                if cursor.next_is_primary()? { Port::Primary } else { Port::Secondary }
            }
            Rule::Cidr(table) => match headers::ipv4_source(frame) {
                Some(src) if table.contains(src) => Port::Primary,
                _ => Port::Secondary,
            },
        };

        let mac = match port {
            Port::Primary => self.primary_mac,
            Port::Secondary => self.secondary_mac,
        };
        if let Some(mac) = mac {
            if !headers::set_destination_mac(frame, &mac.0) {
                trace!("frame of {} bytes too short for MAC rewrite", frame.len());
            }
        }
        Ok(port)
    }
}
