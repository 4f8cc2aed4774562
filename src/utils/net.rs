use std::fmt;
use std::net::TcpListener;

use crate::constants::GRPC_PORT_OFFSET;
use crate::constants::HTTP_PORT_OFFSET;
use crate::constants::P2P_PORT_OFFSET;
use crate::constants::PORT_STRIDE;
use crate::LaunchError;
use crate::Result;

/// The three ports a peer listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerPorts {
    /// Internal consensus traffic between peers
    pub p2p: u16,
    pub grpc: u16,
    pub http: u16,
}

impl PeerPorts {
    /// Reserves three free ephemeral ports.
    pub fn allocate() -> Result<Self> {
        Ok(Self {
            p2p: allocate_port()?,
            grpc: allocate_port()?,
            http: allocate_port()?,
        })
    }

    /// Lays the three ports out from `base` as +0, +1, +2.
    pub fn from_base(base: u16) -> Result<Self> {
        let offset = |o: u16| {
            base.checked_add(o).ok_or(LaunchError::PortOutOfRange {
                seed: base,
                peer_index: 0,
            })
        };
        Ok(Self {
            p2p: offset(P2P_PORT_OFFSET)?,
            grpc: offset(GRPC_PORT_OFFSET)?,
            http: offset(HTTP_PORT_OFFSET)?,
        })
    }

    /// Seeded ports when a seed is given, fresh ephemeral ports otherwise.
    pub fn for_peer(
        seed: Option<u16>,
        peer_index: usize,
    ) -> Result<Self> {
        match seed {
            Some(seed) => derive_ports(seed, peer_index),
            None => Self::allocate(),
        }
    }
}

impl fmt::Display for PeerPorts {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "p2p={}, grpc={}, http={}", self.p2p, self.grpc, self.http)
    }
}

/// Binds port 0 on the wildcard address and returns what the OS picked.
///
/// The listener is dropped before returning, so another process may grab the
/// port before the peer binds it.
pub fn allocate_port() -> Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0)).map_err(LaunchError::PortAllocation)?;
    let port = listener.local_addr().map_err(LaunchError::PortAllocation)?.port();
    drop(listener);
    Ok(port)
}

/// Deterministic ports for peer `peer_index`: `seed + peer_index * 100` and the
/// two following ports.
pub fn derive_ports(
    seed: u16,
    peer_index: usize,
) -> Result<PeerPorts> {
    let out_of_range = || LaunchError::PortOutOfRange { seed, peer_index };

    let base = (peer_index as u64)
        .checked_mul(PORT_STRIDE as u64)
        .and_then(|shift| shift.checked_add(seed as u64))
        .filter(|base| base + (HTTP_PORT_OFFSET as u64) <= u16::MAX as u64)
        .ok_or_else(out_of_range)?;

    PeerPorts::from_base(base as u16).map_err(|_| out_of_range().into())
}

/// accept ip either like 127.0.0.1 or docker host name: node1
pub(crate) fn address_str(addr: &str) -> String {
    // Strip existing "http://" or "https://" prefixes if duplicated.
    let normalized = addr.trim_start_matches("http://").trim_start_matches("https://");
    format!("http://{normalized}")
}

/// Base URI of a peer endpoint, e.g. `http://127.0.0.1:6333`.
pub fn peer_uri(
    host: &str,
    port: u16,
) -> String {
    address_str(&format!("{host}:{port}"))
}
