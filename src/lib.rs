//! Test harness for multi-process consensus clusters.
//!
//! Boots N server processes (a founder, then joiners bootstrapping from it),
//! and waits for them to converge on membership, leadership and collection
//! placement through bounded polling of their HTTP API.
//!
//! - [`ClusterBuilder`] / [`Cluster`]: per-test owner of peers and processes
//! - [`Convergence`]: the `wait_*` operations
//! - [`wait_for`] with a [`Condition`]: the generic poller
//! - [`PeerClient`]: read-only queries against one peer

pub mod checks;
pub mod client;
pub mod cluster;
pub mod config;
pub mod constants;
mod errors;
pub mod peer;
pub mod poll;
pub mod process;
pub mod utils;

pub use checks::Convergence;
pub use client::PeerClient;
pub use cluster::*;
pub use config::HarnessConfig;
pub use errors::*;
pub use peer::*;
pub use poll::*;
pub use process::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
