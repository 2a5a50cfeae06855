// src/cidr.rs
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: u32,
    prefix: u8,
}

impl Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> anyhow::Result<Self> {
        if prefix > 32 {
            anyhow::bail!("prefix length {} out of range for {}", prefix, addr);
        }
        let network = u32::from(addr) & Self::mask(prefix);
        Ok(Self { network, prefix })
    }

    #[inline]
    fn mask(prefix: u8) -> u32 {
        if prefix == 0 { 0 } else { u32::MAX << (32 - prefix as u32) }
    }

    #[inline]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask(self.prefix) == self.network
    }
}

impl FromStr for Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("missing prefix length in {:?}", s))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid network address in {:?}", s))?;
        let prefix: u8 = len
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid prefix length in {:?}", s))?;
        Cidr::new(addr, prefix)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.prefix)
    }
}

/// Source networks whose traffic goes out the primary interface.
#[derive(Debug, Clone, Default)]
pub struct CidrTable {
    entries: Vec<Cidr>,
}

impl CidrTable {
    /// Parses a comma separated list such as `10.0.0.0/8,192.168.1.0/24`.
    /// Any bad entry fails the whole list.
    pub fn parse(list: &str) -> anyhow::Result<Self> {
        let entries = list
            .split(',')
            .map(str::parse::<Cidr>)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    #[inline]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.entries.iter().any(|c| c.contains(addr))
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl fmt::Display for CidrTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
