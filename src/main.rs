// src/main.rs
mod cache;
mod checksum;
mod cidr;
mod classify;
mod config;
mod error;
mod headers;
mod metrics;
mod net;
mod repair;
mod replay;
mod source;
mod source_pcap;
mod source_snoop;
mod stats;
mod timing;
mod tx;
mod util;

use crate::config::{AppConfig, Cli};
use crate::net::LinkSocket;
use crate::replay::{Outcome, ReplayLoop};
use crate::tx::Transmitter;
use crate::util::{pin_to_core_if_set, set_realtime_priority_if, BarrierFlag};
use anyhow::Context;
use clap::Parser;
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli)?;

    let level = match cfg.general.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    log::debug!("loaded config: {:?}", cfg);
    let session = cfg.session()?;

    let _metrics_handle = cfg.metrics.as_ref().map(|m| metrics::spawn_http(m.bind.clone()));

    let cancel = Arc::new(BarrierFlag::default());
    {
        let c = cancel.clone();
        ctrlc::set_handler(move || c.raise())?;
    }

    pin_to_core_if_set(cfg.general.cpu_core);
    set_realtime_priority_if(cfg.general.rt_priority);

    let primary = LinkSocket::open(&session.primary)
        .with_context(|| format!("can't open {}", session.primary))?;
    let secondary = match &session.secondary {
        Some(name) => Some(LinkSocket::open(name).with_context(|| format!("can't open {}", name))?),
        None => None,
    };
    info!("sending on {} {}", session.primary, session.secondary.as_deref().unwrap_or(""));
    if let Some(mac) = session.primary_mac {
        info!("rewriting destination MAC to {} on {}", mac, session.primary);
    }
    if let (Some(mac), Some(name)) = (session.secondary_mac, &session.secondary) {
        info!("rewriting destination MAC to {} on {}", mac, name);
    }

    let mut replay = ReplayLoop::new(&session, Transmitter::new(primary, secondary), cancel);
    let result = replay.run(&cfg.inputs, source::open_input);
    let report = replay.finish();

    match result {
        Ok(Outcome::Completed) => {
            if report.counters.bytes_sent > 0 {
                eprintln!("{report}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Ok(Outcome::Cancelled) => {
            eprintln!("{report}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("{report}");
            Ok(ExitCode::FAILURE)
        }
    }
}
