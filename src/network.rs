//! IPv4 subnets for the global container networks.

use crate::error::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 CIDR block, always stored in normalised (masked) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::Config(format!("Invalid prefix length /{}", prefix)));
        }
        let network = Ipv4Addr::from(u32::from(addr) & Self::mask(prefix));
        Ok(Self { network, prefix })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask(self.prefix) == u32::from(self.network)
    }

    /// Two blocks overlap iff the wider one contains the other's network address.
    pub fn overlaps(&self, other: &Subnet) -> bool {
        if self.prefix <= other.prefix {
            self.contains(other.network)
        } else {
            other.contains(self.network)
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("Subnet '{}' is missing a prefix length", s)))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::Config(format!("Subnet '{}' has an invalid address", s)))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| Error::Config(format!("Subnet '{}' has an invalid prefix", s)))?;
        Subnet::new(addr, prefix)
    }
}

/// Pool the global networks are carved from.
pub const SUBNET_POOL: &str = "10.0.0.0/8";

/// First `/16` inside [`SUBNET_POOL`] that overlaps none of `taken`.
pub fn next_free_slash16(taken: &[Subnet]) -> Result<Subnet> {
    for second in 0..=255u8 {
        let candidate = Subnet::new(Ipv4Addr::new(10, second, 0, 0), 16)?;
        if !taken.iter().any(|t| t.overlaps(&candidate)) {
            return Ok(candidate);
        }
    }
    Err(Error::SubnetExhausted(SUBNET_POOL.to_string()))
}

/// Parse whatever subnets `docker network inspect` printed, one per
/// whitespace-separated token. IPv6 and garbage entries are ignored.
pub fn parse_subnet_list(text: &str) -> Vec<Subnet> {
    text.split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Subnet {
        s.parse().unwrap()
    }

    #[test]
    fn parse_normalises_host_bits() {
        assert_eq!(net("10.3.7.9/16").to_string(), "10.3.0.0/16");
        assert!("10.0.0.0".parse::<Subnet>().is_err());
        assert!("10.0.0.0/40".parse::<Subnet>().is_err());
        assert!("fd00::/64".parse::<Subnet>().is_err());
    }

    #[test]
    fn overlap_is_symmetric() {
        let wide = net("10.0.0.0/8");
        let narrow = net("10.4.0.0/16");
        let other = net("172.17.0.0/16");
        assert!(wide.overlaps(&narrow));
        assert!(narrow.overlaps(&wide));
        assert!(!narrow.overlaps(&other));
        assert!(!net("10.4.0.0/16").overlaps(&net("10.5.0.0/16")));
    }

    #[test]
    fn next_free_skips_taken_blocks() {
        let taken = vec![net("10.0.0.0/16"), net("10.1.128.0/24"), net("172.17.0.0/16")];
        assert_eq!(next_free_slash16(&taken).unwrap(), net("10.2.0.0/16"));
        assert_eq!(next_free_slash16(&[]).unwrap(), net("10.0.0.0/16"));
    }

    #[test]
    fn exhausted_pool_is_an_error() {
        let taken = vec![net("10.0.0.0/8")];
        assert!(matches!(
            next_free_slash16(&taken),
            Err(Error::SubnetExhausted(_))
        ));
    }

    #[test]
    fn parses_docker_inspect_output() {
        let list = parse_subnet_list("172.17.0.0/16\n10.0.0.0/16 fd00::/64\n\n");
        assert_eq!(list, vec![net("172.17.0.0/16"), net("10.0.0.0/16")]);
    }
}
