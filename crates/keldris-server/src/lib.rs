//! Keldris HTTP server process.
//!
//! Wires `keldris-core`'s components into a running process: configuration,
//! shared state, and the network-boundary implementations (OIDC discovery
//! and token exchange, webhook delivery over HTTP) that the core crate keeps
//! itself free of. The HTTP router/handler layer itself is intentionally
//! not part of this crate's surface.

pub mod config;
pub mod error;
pub mod oidc_client;
pub mod state;
pub mod webhook_transport;
