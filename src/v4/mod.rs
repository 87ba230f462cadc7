//! DHCPv4 relay implementation
//!
//! This module contains the DHCPv4-specific relay logic including:
//! - Message classification and per-type field rewriting
//! - The raw option area, relayed byte for byte
//! - Correlation of server replies with client requests
//! - The decision engine shared by both receive loops

pub mod handler;
pub mod message;
pub mod options;
pub mod tracker;

pub use handler::{inspect, Forward, RelayHandler};
pub use message::{transform, MessageType, Packet, TransactionId};
pub use options::RawOptions;
pub use tracker::TransactionTracker;
