//! DHCPv4 relay decision engine
//!
//! Validates a received datagram, applies the per-type rewrite, keeps the
//! transaction tracker current and decides where the result goes. The engine does
//! no I/O: it returns [`Forward`]s which the receive loop hands to the transport.

use super::message::{
    format_chaddr, server_identifier, transform, MessageType, Packet, TransactionId,
};
use super::tracker::TransactionTracker;
use crate::{
    config::{RelayConfig, BROADCAST_ADDRESS, DHCP_CLIENT_PORT, DHCP_SERVER_PORT},
    error::Discard,
    network::Role,
};
use bytes::Bytes;
use dhcproto::v4;
use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Fixed BOOTP header plus the magic cookie.
pub const MIN_PACKET_LEN: usize = 240;
pub const MAX_HLEN: u8 = 16;
const HLEN_OFFSET: usize = 2;

/// One datagram the relay must send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    pub payload: Bytes,
    pub destination: SocketAddrV4,
    pub source: Ipv4Addr,
    pub egress: Role,
}

#[derive(Debug)]
pub struct RelayHandler {
    relay_addr: Ipv4Addr,
    servers: Vec<Ipv4Addr>,
    tracker: Mutex<TransactionTracker>,
}

impl RelayHandler {
    pub fn new(relay_addr: Ipv4Addr, servers: Vec<Ipv4Addr>, tracker: TransactionTracker) -> Self {
        Self {
            relay_addr,
            servers,
            tracker: Mutex::new(tracker),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.relay_address,
            config.servers.clone(),
            TransactionTracker::new(config.transaction_ttl, config.transaction_capacity),
        )
    }

    pub fn relay_addr(&self) -> Ipv4Addr {
        self.relay_addr
    }

    pub fn servers(&self) -> &[Ipv4Addr] {
        &self.servers
    }

    /// Whether a client request with this id has been relayed and not yet expired.
    pub fn is_seen(&self, id: TransactionId) -> bool {
        self.tracker().seen(id)
    }

    // The tracker is never left half-updated, so a poisoned lock is still usable.
    fn tracker(&self) -> MutexGuard<'_, TransactionTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one received datagram through the relay and returns what to send.
    pub fn handle_datagram(&self, data: &[u8]) -> Result<Vec<Forward>, Discard> {
        let (packet, kind) = inspect(data)?;
        let relayed = self.process(&packet, kind)?;
        self.route(&relayed)
    }

    /// Applies correlation and the rewrite rules to a decoded message.
    pub fn process(&self, packet: &Packet, kind: MessageType) -> Result<Packet, Discard> {
        let msg = packet.header();
        let xid = packet.xid();
        let chaddr = format_chaddr(msg.chaddr());

        match kind {
            MessageType::Discover | MessageType::Request => {
                self.tracker().mark(xid);
                tracing::info!(%xid, %chaddr, ciaddr = %msg.ciaddr(), "Relaying {:?} to servers", kind);
            }
            MessageType::Offer | MessageType::Ack | MessageType::Nak => {
                if !self.tracker().seen(xid) {
                    return Err(Discard::Unsolicited(xid));
                }
                match kind {
                    MessageType::Nak => {
                        tracing::info!(%xid, %chaddr, siaddr = %msg.siaddr(), "Relaying Nak to client");
                    }
                    _ => {
                        let server = server_identifier(packet.options())
                            .map(|ip| ip.to_string())
                            .unwrap_or_else(|| "unknown".to_string());
                        tracing::info!(
                            %xid,
                            %chaddr,
                            %server,
                            yiaddr = %msg.yiaddr(),
                            "Relaying {:?} to client",
                            kind
                        );
                    }
                }
            }
            MessageType::Release | MessageType::Decline => {
                tracing::info!(%xid, %chaddr, "Relaying {:?} to servers", kind);
            }
            MessageType::Inform => {}
        }

        transform(packet, kind, self.relay_addr).ok_or(Discard::Unhandled(kind))
    }

    /// Picks the destinations for a relayed message from its opcode alone.
    pub fn route(&self, packet: &Packet) -> Result<Vec<Forward>, Discard> {
        let payload = packet.encode()?;

        let forwards = match packet.header().opcode() {
            v4::Opcode::BootRequest => self
                .servers
                .iter()
                .map(|server| Forward {
                    payload: payload.clone(),
                    destination: SocketAddrV4::new(*server, DHCP_SERVER_PORT),
                    source: self.relay_addr,
                    egress: Role::ServerFacing,
                })
                .collect(),
            _ => vec![Forward {
                payload,
                destination: SocketAddrV4::new(BROADCAST_ADDRESS, DHCP_CLIENT_PORT),
                source: self.relay_addr,
                egress: Role::ClientFacing,
            }],
        };
        Ok(forwards)
    }
}

/// Structural checks, decode, and message type classification.
pub fn inspect(data: &[u8]) -> Result<(Packet, MessageType), Discard> {
    if data.len() < MIN_PACKET_LEN {
        return Err(Discard::TooShort(data.len()));
    }
    let hlen = data[HLEN_OFFSET];
    if hlen > MAX_HLEN {
        return Err(Discard::HardwareAddressTooLong(hlen));
    }

    let packet = Packet::decode(data)?;
    let kind = MessageType::of(packet.options())?;
    Ok((packet, kind))
}
