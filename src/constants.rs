// -
// Polling defaults

/// How long a convergence wait may take before it fails.
pub(crate) const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Pause between two evaluations of the same condition.
pub(crate) const DEFAULT_RETRY_INTERVAL_MS: u64 = 500;

// -
// Ports

/// Distance between the port bases of two consecutive peers when a seed is given.
pub const PORT_STRIDE: u16 = 100;

pub(crate) const P2P_PORT_OFFSET: u16 = 0;
pub(crate) const GRPC_PORT_OFFSET: u16 = 1;
pub(crate) const HTTP_PORT_OFFSET: u16 = 2;

// -
// Peer launch

pub(crate) const ARG_URI: &str = "--uri";
pub(crate) const ARG_BOOTSTRAP: &str = "--bootstrap";

/// Index of the founding peer inside a cluster.
pub const FOUNDER_INDEX: usize = 0;
