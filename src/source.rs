//! Lazy entry sources for dispatch jobs
//!
//! Both sources walk addresses with plain integer arithmetic and build each
//! [`Entry`] on demand, so a job over a `/8` never holds more than one batch
//! in memory. Entry names are `prefix + n` with `n` starting at 1.

use crate::error::{Error, Result};
use crate::types::Entry;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 or IPv6 network in CIDR notation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Network {
    base: IpAddr,
    prefix_len: u8,
}

impl Network {
    /// Network address
    pub fn base(&self) -> IpAddr {
        self.base
    }

    /// Prefix length
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    fn max_prefix(&self) -> u8 {
        match self.base {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    fn host_bits(&self) -> u32 {
        u32::from(self.max_prefix() - self.prefix_len)
    }

    fn host_mask(&self) -> u128 {
        match self.host_bits() {
            128 => u128::MAX,
            bits => (1u128 << bits) - 1,
        }
    }

    /// Every address in the network, including network and broadcast
    ///
    /// Saturates at `u128::MAX` for `::/0`.
    pub fn address_count(&self) -> u128 {
        match self.host_bits() {
            128 => u128::MAX,
            bits => 1u128 << bits,
        }
    }

    /// First and last usable host as integers, inclusive
    ///
    /// IPv4 excludes the network and broadcast addresses except for `/31`
    /// and `/32`. IPv6 excludes the subnet-router anycast (first) address
    /// except for `/127` and `/128`.
    fn host_range(&self) -> (u128, u128) {
        let first = to_u128(self.base);
        let last = first | self.host_mask();
        match (self.base, self.host_bits()) {
            (_, 0) | (_, 1) => (first, last),
            (IpAddr::V4(_), _) => (first + 1, last - 1),
            (IpAddr::V6(_), _) => (first + 1, last),
        }
    }

    /// Number of usable hosts
    pub fn host_count(&self) -> u128 {
        let (first, last) = self.host_range();
        (last - first).saturating_add(1)
    }
}

impl FromStr for Network {
    type Err = Error;

    /// Parse `address/prefix` strictly; a bare address is a single-host network
    fn from_str(text: &str) -> Result<Self> {
        let (address, prefix) = match text.trim().split_once('/') {
            Some((address, prefix)) => (address, Some(prefix)),
            None => (text.trim(), None),
        };

        let base: IpAddr = address
            .parse()
            .map_err(|_| Error::Validation(format!("invalid network address in {text:?}")))?;
        let max_prefix = if base.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|len| *len <= max_prefix)
                .ok_or_else(|| Error::Validation(format!("invalid prefix length in {text:?}")))?,
            None => max_prefix,
        };

        let network = Self { base, prefix_len };
        if to_u128(base) & network.host_mask() != 0 {
            return Err(Error::Validation(format!("{text} has host bits set")));
        }
        Ok(network)
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}

fn to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

// `value` always comes from the same family's range, so the v4 cast cannot truncate.
fn to_ip(family: IpAddr, value: u128) -> IpAddr {
    match family {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(value as u32)),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

/// Entries for every usable host of a network
#[derive(Clone, Debug)]
pub struct RangeSource {
    network: Network,
    prefix: String,
    timeout: u64,
    next: u128,
    last: u128,
    exhausted: bool,
    produced: u64,
}

impl RangeSource {
    /// Create a source over `network`
    pub fn new(network: Network, prefix: impl Into<String>, timeout: u64) -> Self {
        let (next, last) = network.host_range();
        Self {
            network,
            prefix: prefix.into(),
            timeout,
            next,
            last,
            exhausted: false,
            produced: 0,
        }
    }

    /// The network being walked
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Logged batch estimate: `address_count / batch_size + 1`
    ///
    /// Not an exact ceiling; completion is driven by exhaustion.
    pub fn estimated_batches(&self, batch_size: usize) -> u128 {
        self.network.address_count() / batch_size.max(1) as u128 + 1
    }
}

impl Iterator for RangeSource {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        if self.exhausted {
            return None;
        }
        let value = self.next;
        if value == self.last {
            self.exhausted = true;
        } else {
            self.next += 1;
        }
        self.produced += 1;
        Some(Entry::new(
            format!("{}{}", self.prefix, self.produced),
            to_ip(self.network.base, value),
            self.timeout,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted {
            return (0, Some(0));
        }
        let remaining = (self.last - self.next).saturating_add(1);
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

/// `count` entries at consecutive addresses starting from a base address
#[derive(Clone, Debug)]
pub struct CountSource {
    base: IpAddr,
    count: u64,
    prefix: String,
    timeout: u64,
    index: u64,
}

impl CountSource {
    /// Create a source, rejecting counts that would run past the end of the address family
    pub fn new(base: IpAddr, count: u64, prefix: impl Into<String>, timeout: u64) -> Result<Self> {
        if count > 0 {
            let max = match base {
                IpAddr::V4(_) => u128::from(u32::MAX),
                IpAddr::V6(_) => u128::MAX,
            };
            let headroom = max - to_u128(base);
            if u128::from(count - 1) > headroom {
                return Err(Error::Validation(format!(
                    "{count} addresses starting at {base} exceed the address space"
                )));
            }
        }
        Ok(Self {
            base,
            count,
            prefix: prefix.into(),
            timeout,
            index: 0,
        })
    }

    /// Total entries this source yields
    pub fn total(&self) -> u64 {
        self.count
    }
}

impl Iterator for CountSource {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        if self.index >= self.count {
            return None;
        }
        let i = self.index;
        self.index += 1;
        Some(Entry::new(
            format!("{}{}", self.prefix, i + 1),
            to_ip(self.base, to_u128(self.base) + u128::from(i)),
            self.timeout,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

/// Either job shape's source, consumed once per job
#[derive(Clone, Debug)]
pub enum EntrySource {
    /// Range-driven
    Range(RangeSource),
    /// Count-driven
    Count(CountSource),
}

impl Iterator for EntrySource {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        match self {
            EntrySource::Range(source) => source.next(),
            EntrySource::Count(source) => source.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            EntrySource::Range(source) => source.size_hint(),
            EntrySource::Count(source) => source.size_hint(),
        }
    }
}
