use crate::network::{Role, SocketError};
use std::{io, net::AddrParseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("A relay agent address (--giaddr) is required")]
    MissingRelayAddress,

    #[error("Relay agent address must not be {0}")]
    UnusableRelayAddress(std::net::Ipv4Addr),

    #[error("Invalid IPv4 address '{value}'")]
    InvalidAddress {
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("Receive loop on the {role} interface failed")]
    Receive {
        role: Role,
        #[source]
        source: io::Error,
    },

    #[error("Receive loop task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a datagram produced no relay action.
///
/// These never leave the receive loop; they are logged and the datagram is dropped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Discard {
    #[error("datagram of {0} bytes is shorter than a BOOTP header")]
    TooShort(usize),

    #[error("hardware address length {0} exceeds 16")]
    HardwareAddressTooLong(u8),

    #[error("failed to decode DHCP message: {0}")]
    Malformed(String),

    #[error("missing or malformed message type option")]
    MissingMessageType,

    #[error("message type {0} is out of range")]
    UnknownMessageType(u8),

    #[error("{0:?} is not relayed")]
    Unhandled(crate::v4::MessageType),

    #[error("no request seen for transaction {0}")]
    Unsolicited(crate::v4::TransactionId),

    #[error("failed to encode relayed message: {0}")]
    Encode(String),
}
