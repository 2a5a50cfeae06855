// src/config.rs
use crate::cache::RoutingCache;
use crate::cidr::CidrTable;
use clap::Parser;
use serde::Deserialize;
use std::{fmt, fs, path::Path, path::PathBuf, str::FromStr};

/// Default pacing when no speed option is given, in megabits per second.
pub const DEFAULT_RATE_MBPS: f64 = 10.0;

#[derive(Parser, Debug, Default)]
#[command(name = "tcpreplay", version)]
#[command(about = "Replay captured traffic onto one or two live interfaces")]
pub struct Cli {
    /// Optional TOML file; command line options override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Primary interface to send on
    #[arg(short = 'i', long = "intf")]
    pub primary: Option<String>,

    /// Secondary interface (requires -c or -C)
    #[arg(short = 'j', long = "intf2")]
    pub secondary: Option<String>,

    /// Rewrite destination MAC of frames sent on the primary interface
    #[arg(short = 'I', long = "primary-mac")]
    pub primary_mac: Option<String>,

    /// Rewrite destination MAC of frames sent on the secondary interface
    #[arg(short = 'J', long = "secondary-mac")]
    pub secondary_mac: Option<String>,

    /// Number of times to replay the input files
    #[arg(short = 'l', long = "loop")]
    pub loops: Option<u32>,

    /// Replay at a multiple of the captured speed
    #[arg(short = 'm', long)]
    pub multiplier: Option<f64>,

    /// Replay at a constant rate in megabits per second
    #[arg(short = 'r', long = "rate")]
    pub rate_mbps: Option<f64>,

    /// Replay as fast as possible
    #[arg(short = 'R', long)]
    pub topspeed: bool,

    /// Routing cache file splitting traffic between the interfaces
    #[arg(short = 'c', long)]
    pub cache: Option<PathBuf>,

    /// Comma separated CIDR list; matching sources go out the primary interface
    #[arg(short = 'C', long)]
    pub cidr: Option<String>,

    /// Repair frames truncated at capture time: pad or trunc
    #[arg(short = 'u', long = "untruncate")]
    pub repair: Option<String>,

    /// More logging (repeat for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Capture files (pcap or snoop); "-" reads standard input
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub inputs: Vec<String>,
    pub loops: Option<u32>,
    pub general: General,
    pub interfaces: Interfaces,
    pub speed: Speed,
    pub split: Split,
    pub repair: Option<String>,
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct General {
    pub verbose: u8,
    /// Pin the replay thread to this CPU (best-effort)
    pub cpu_core: Option<usize>,
    /// SCHED_FIFO priority if set (Linux)
    pub rt_priority: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Interfaces {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub primary_mac: Option<String>,
    pub secondary_mac: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Speed {
    pub topspeed: bool,
    pub multiplier: Option<f64>,
    pub rate_mbps: Option<f64>,
}

impl Speed {
    fn is_set(&self) -> bool {
        self.topspeed || self.multiplier.is_some() || self.rate_mbps.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Split {
    pub cache: Option<PathBuf>,
    pub cidr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metrics {
    /// Bind address for Prometheus exporter (e.g. "0.0.0.0:9100")
    pub bind: String,
}

impl AppConfig {
    pub fn from_file(p: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(p)?;
        let cfg: AppConfig = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// File values (if `--config` was given) overlaid with command line options.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut cfg = match &cli.config {
            Some(p) => Self::from_file(p)
                .map_err(|e| anyhow::anyhow!("config {}: {e}", p.display()))?,
            None => AppConfig::default(),
        };
        cfg.apply_cli(cli);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if !cli.inputs.is_empty() {
            self.inputs = cli.inputs.clone();
        }
        overlay(&mut self.loops, cli.loops);
        overlay(&mut self.interfaces.primary, cli.primary.clone());
        overlay(&mut self.interfaces.secondary, cli.secondary.clone());
        overlay(&mut self.interfaces.primary_mac, cli.primary_mac.clone());
        overlay(&mut self.interfaces.secondary_mac, cli.secondary_mac.clone());
        let cli_speed = Speed {
            topspeed: cli.topspeed,
            multiplier: cli.multiplier,
            rate_mbps: cli.rate_mbps,
        };
        if cli_speed.is_set() {
            self.speed = cli_speed;
        }
        overlay(&mut self.split.cache, cli.cache.clone());
        overlay(&mut self.split.cidr, cli.cidr.clone());
        overlay(&mut self.repair, cli.repair.clone());
        self.general.verbose = self.general.verbose.max(cli.verbose);
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inputs.is_empty() {
            anyhow::bail!("no capture files given");
        }
        if self.inputs.len() > 1 && self.inputs.iter().any(|p| p == "-") {
            anyhow::bail!("stdin must be the only file specified");
        }
        if self.loops == Some(0) {
            anyhow::bail!("invalid loop count: 0");
        }
        if self.interfaces.primary.is_none() {
            anyhow::bail!("must specify interface");
        }
        let s = &self.speed;
        let modes = [s.topspeed, s.multiplier.is_some(), s.rate_mbps.is_some()];
        if modes.iter().filter(|m| **m).count() > 1 {
            anyhow::bail!("topspeed, multiplier and rate are mutually exclusive");
        }
        if let Some(m) = s.multiplier {
            if !(m.is_finite() && m > 0.0) {
                anyhow::bail!("invalid multiplier: {m}");
            }
        }
        if let Some(r) = s.rate_mbps {
            if !(r.is_finite() && r > 0.0) {
                anyhow::bail!("invalid rate: {r}");
            }
        }
        let has_secondary = self.interfaces.secondary.is_some();
        if self.split.cache.is_some() && !has_secondary {
            anyhow::bail!("needs secondary interface with cache");
        }
        if has_secondary && self.split.cache.is_none() && self.split.cidr.is_none() {
            anyhow::bail!("needs cache or cidr match with secondary interface");
        }
        if self.split.cache.is_some() && self.split.cidr.is_some() {
            anyhow::bail!("cache and cidr match are mutually exclusive");
        }
        if let Some(r) = &self.repair {
            r.parse::<RepairMode>()?;
        }
        for mac in [&self.interfaces.primary_mac, &self.interfaces.secondary_mac].into_iter().flatten() {
            mac.parse::<MacAddr>()?;
        }
        Ok(())
    }

    /// Builds the immutable session configuration. Loads the routing cache
    /// and parses the CIDR list, so this can fail on bad files too.
    pub fn session(&self) -> anyhow::Result<SessionConfig> {
        let speed = if self.speed.topspeed {
            SpeedMode::AsFastAsPossible
        } else if let Some(m) = self.speed.multiplier {
            SpeedMode::Multiplier(m)
        } else {
            SpeedMode::from_mbps(self.speed.rate_mbps.unwrap_or(DEFAULT_RATE_MBPS))
        };

        let split = match (&self.interfaces.secondary, &self.split.cache, &self.split.cidr) {
            (Some(_), Some(path), _) => {
                let cache = RoutingCache::from_file(path)?;
                log::debug!("routing cache {} holds {} decisions", path.display(), cache.packets());
                SplitMode::Cache(cache)
            }
            (Some(_), None, Some(list)) => {
                let table = CidrTable::parse(list)?;
                log::debug!("cidr split over {} networks: {}", table.len(), table);
                SplitMode::Cidr(table)
            }
            (None, _, Some(list)) => {
                log::warn!("ignoring cidr match {list:?} without a secondary interface");
                SplitMode::Single
            }
            _ => SplitMode::Single,
        };

        let primary = self
            .interfaces
            .primary
            .clone()
            .ok_or_else(|| anyhow::anyhow!("must specify interface"))?;

        Ok(SessionConfig {
            speed,
            split,
            primary,
            secondary: self.interfaces.secondary.clone(),
            primary_mac: self.interfaces.primary_mac.as_deref().map(str::parse::<MacAddr>).transpose()?,
            secondary_mac: self.interfaces.secondary_mac.as_deref().map(str::parse::<MacAddr>).transpose()?,
            repair: self
                .repair
                .as_deref()
                .map(str::parse::<RepairMode>)
                .transpose()?
                .unwrap_or(RepairMode::None),
            loops: self.loops.unwrap_or(1),
        })
    }
}

fn overlay<T>(dst: &mut Option<T>, src: Option<T>) {
    if src.is_some() {
        *dst = src;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedMode {
    AsFastAsPossible,
    Multiplier(f64),
    /// Bytes per second
    FixedRate(f64),
}

impl SpeedMode {
    /// Megabits here are 1024 * 1024 bits.
    pub fn from_mbps(mbps: f64) -> Self {
        SpeedMode::FixedRate(mbps * (1024.0 * 1024.0) / 8.0)
    }
}

#[derive(Debug, Clone)]
pub enum SplitMode {
    Single,
    Cache(RoutingCache),
    Cidr(CidrTable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    None,
    Pad,
    Truncate,
}

impl FromStr for RepairMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "pad" => Ok(RepairMode::Pad),
            "trunc" | "truncate" => Ok(RepairMode::Truncate),
            "none" => Ok(RepairMode::None),
            other => anyhow::bail!("invalid untruncate option: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl FromStr for MacAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut out = [0u8; 6];
        let mut parts = s.trim().split(':');
        for b in out.iter_mut() {
            let p = parts.next().unwrap_or("");
            if p.is_empty() || p.len() > 2 {
                anyhow::bail!("invalid mac address: {s}");
            }
            *b = u8::from_str_radix(p, 16).map_err(|_| anyhow::anyhow!("invalid mac address: {s}"))?;
        }
        if parts.next().is_some() {
            anyhow::bail!("invalid mac address: {s}");
        }
        Ok(MacAddr(out))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::util::fmt_mac(&self.0))
    }
}

/// Everything the replay loop needs, fixed for the whole session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub speed: SpeedMode,
    pub split: SplitMode,
    pub primary: String,
    pub secondary: Option<String>,
    pub primary_mac: Option<MacAddr>,
    pub secondary_mac: Option<MacAddr>,
    pub repair: RepairMode,
    pub loops: u32,
}
