//! # Courier - A DHCPv4/BOOTP Relay Agent
//!
//! Courier forwards DHCP traffic between a client subnet and one or more DHCP
//! servers reachable through a second interface, following the relay agent rules
//! of RFC 1542 and RFC 2131.
//!
//! ## Features
//!
//! - Options relayed byte for byte, never re-encoded
//! - GIADDR stamping and broadcast-flag clearing for client requests
//! - Replies relayed only for transactions the relay has seen a request for
//! - Explicit source address and egress interface on every relayed datagram
//! - Asynchronous operation using Tokio, one receive loop per interface
//!
//! ## Example
//!
//! ```rust,no_run
//! use courier::{RelayAgent, RelayConfig};
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::new("eth0".to_string(), "eth1".to_string(), Ipv4Addr::new(10, 0, 0, 1))
//!         .with_servers(vec![Ipv4Addr::new(10, 1, 0, 2)]);
//!     let agent = RelayAgent::new(config)?;
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     agent.run(shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod relay;
pub mod v4;

pub use config::{Args, RelayConfig};
pub use error::{Discard, RelayError};
pub use network::Role;
pub use relay::RelayAgent;
pub use v4::{Forward, MessageType, RelayHandler, TransactionId, TransactionTracker};
