// Copyright (c) 2024 Botho Foundation

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
};

use super::WireError;

/// Length of an encoded address: 1 length byte, 16 address bytes (IPv4 is
/// zero padded) and a little-endian port.
pub const ADDR_LEN: usize = 1 + 16 + 2;

/// A node address, IPv4 or IPv6 plus port.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddrPort(SocketAddr);

impl AddrPort {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn to_bytes(&self) -> [u8; ADDR_LEN] {
        let mut out = [0u8; ADDR_LEN];
        match self.0.ip() {
            IpAddr::V4(ip) => {
                out[0] = 4;
                out[1..5].copy_from_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                out[0] = 16;
                out[1..17].copy_from_slice(&ip.octets());
            }
        }
        out[17..].copy_from_slice(&self.0.port().to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; ADDR_LEN]) -> Result<Self, WireError> {
        let port = u16::from_le_bytes([bytes[17], bytes[18]]);
        let ip = match bytes[0] {
            4 => {
                // Padding must be zero so each address has one encoding
                if bytes[5..17].iter().any(|&b| b != 0) {
                    return Err(WireError::InvalidAddress);
                }
                IpAddr::V4(Ipv4Addr::new(bytes[1], bytes[2], bytes[3], bytes[4]))
            }
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&bytes[1..17]);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => return Err(WireError::InvalidAddress),
        };
        Ok(Self(SocketAddr::new(ip, port)))
    }
}

impl From<SocketAddr> for AddrPort {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for AddrPort {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| WireError::InvalidAddress)
    }
}

impl fmt::Display for AddrPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AddrPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddrPort({})", self.0)
    }
}
