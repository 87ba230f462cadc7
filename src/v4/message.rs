//! Field rewriting for relayed DHCPv4 messages.
//!
//! Every relayed message is built from an empty header; only the fields listed
//! for its type are copied from the inbound one. The option area is carried over
//! byte for byte.

use super::options::{self, RawOptions, COOKIE_OFFSET, MAGIC_COOKIE, OPTIONS_OFFSET};
use crate::error::Discard;
use bytes::{BufMut, Bytes, BytesMut};
use dhcproto::{v4, Decodable, Decoder, Encodable, Encoder};
use std::{fmt, net::Ipv4Addr};

/// Relayed messages are padded to at least this many bytes.
pub const MIN_ENCODED_LEN: usize = 272;

/// DHCP message types the relay understands (option 53, values 1 through 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl MessageType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Discover),
            2 => Some(Self::Offer),
            3 => Some(Self::Request),
            4 => Some(Self::Decline),
            5 => Some(Self::Ack),
            6 => Some(Self::Nak),
            7 => Some(Self::Release),
            8 => Some(Self::Inform),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Decline => 4,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Inform => 8,
        }
    }

    /// Reads option 53, which must hold exactly one byte.
    pub fn of(opts: &RawOptions) -> Result<Self, Discard> {
        match opts.get(options::MESSAGE_TYPE) {
            Some(&[code]) => Self::from_code(code).ok_or(Discard::UnknownMessageType(code)),
            _ => Err(Discard::MissingMessageType),
        }
    }
}

/// Transaction id treated as an opaque 4-byte key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId([u8; 4]);

impl TransactionId {
    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn of(header: &v4::Message) -> Self {
        Self(header.xid().to_be_bytes())
    }
}

impl From<u32> for TransactionId {
    fn from(xid: u32) -> Self {
        Self(xid.to_be_bytes())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A BOOTP message: the fixed header and its raw option area.
///
/// The header is decoded with an empty option list, so no option byte ever reaches
/// a typed decoder.
#[derive(Debug, Clone)]
pub struct Packet {
    header: v4::Message,
    options: RawOptions,
}

impl Packet {
    pub fn new(header: v4::Message, options: RawOptions) -> Self {
        Self { header, options }
    }

    /// Decodes a datagram of at least [`OPTIONS_OFFSET`] bytes.
    pub fn decode(data: &[u8]) -> Result<Self, Discard> {
        if data.len() < OPTIONS_OFFSET {
            return Err(Discard::TooShort(data.len()));
        }
        let (fixed, area) = data.split_at(OPTIONS_OFFSET);
        if fixed[COOKIE_OFFSET..] != MAGIC_COOKIE {
            return Err(Discard::Malformed("bad magic cookie".to_string()));
        }
        let opts = RawOptions::parse(area)?;

        let mut header_only = Vec::with_capacity(OPTIONS_OFFSET + 1);
        header_only.extend_from_slice(fixed);
        header_only.push(options::END);
        let header = v4::Message::decode(&mut Decoder::new(&header_only))
            .map_err(|e| Discard::Malformed(e.to_string()))?;

        Ok(Self {
            header,
            options: opts,
        })
    }

    pub fn header(&self) -> &v4::Message {
        &self.header
    }

    pub fn options(&self) -> &RawOptions {
        &self.options
    }

    pub fn xid(&self) -> TransactionId {
        TransactionId::of(&self.header)
    }

    /// Header, cookie, the options as received, end option, then padding.
    pub fn encode(&self) -> Result<Bytes, Discard> {
        let mut header = Vec::new();
        self.header
            .encode(&mut Encoder::new(&mut header))
            .map_err(|e| Discard::Encode(e.to_string()))?;
        let fixed = header
            .get(..COOKIE_OFFSET)
            .ok_or_else(|| Discard::Encode(format!("header of {} bytes", header.len())))?;

        let mut buf = BytesMut::with_capacity(MIN_ENCODED_LEN);
        buf.put_slice(fixed);
        buf.put_slice(&MAGIC_COOKIE);
        self.options.encode_into(&mut buf);
        if buf.len() < MIN_ENCODED_LEN {
            buf.resize(MIN_ENCODED_LEN, options::PAD);
        }
        Ok(buf.freeze())
    }
}

/// Builds the message to relay for `inbound`, or `None` when the type is not relayed.
///
/// Correlation is the caller's job: this function never consults the transaction
/// tracker and will happily build a reply for an unsolicited Offer.
pub fn transform(inbound: &Packet, kind: MessageType, relay_addr: Ipv4Addr) -> Option<Packet> {
    match kind {
        MessageType::Discover => Some(toward_server(inbound, relay_addr, false)),
        MessageType::Request | MessageType::Release | MessageType::Decline => {
            Some(toward_server(inbound, relay_addr, true))
        }
        MessageType::Offer | MessageType::Ack | MessageType::Nak => Some(toward_client(inbound)),
        MessageType::Inform => None,
    }
}

/// Client to server: stamp GIADDR and clear the broadcast flag.
///
/// A Discover carries only chaddr, xid and options; the other request types
/// also keep the boot file, ciaddr and siaddr.
fn toward_server(packet: &Packet, relay_addr: Ipv4Addr, client_fields: bool) -> Packet {
    let inbound = packet.header();
    let mut msg = v4::Message::default();
    msg.set_opcode(v4::Opcode::BootRequest)
        .set_chaddr(inbound.chaddr())
        .set_xid(inbound.xid())
        .set_giaddr(relay_addr)
        .set_flags(v4::Flags::default());

    if client_fields {
        msg.set_ciaddr(inbound.ciaddr()).set_siaddr(inbound.siaddr());
        if let Some(file) = inbound.fname() {
            msg.set_fname(file);
        }
    }

    Packet::new(msg, packet.options().clone())
}

/// Server to client: copied verbatim apart from the fields a reply never carries.
fn toward_client(packet: &Packet) -> Packet {
    let inbound = packet.header();
    let mut msg = v4::Message::default();
    msg.set_opcode(v4::Opcode::BootReply)
        .set_xid(inbound.xid())
        .set_flags(inbound.flags())
        .set_yiaddr(inbound.yiaddr())
        .set_giaddr(inbound.giaddr())
        .set_siaddr(inbound.siaddr())
        .set_chaddr(inbound.chaddr())
        .set_secs(inbound.secs());

    if let Some(file) = inbound.fname() {
        msg.set_fname(file);
    }

    Packet::new(msg, packet.options().clone())
}

/// Server Identifier (option 54), if the server sent a well-formed one.
pub fn server_identifier(opts: &RawOptions) -> Option<Ipv4Addr> {
    opts.get(options::SERVER_IDENTIFIER)
        .and_then(|value| <[u8; 4]>::try_from(value).ok())
        .map(Ipv4Addr::from)
}

/// Formats a hardware address as colon-separated hex for log lines.
pub fn format_chaddr(chaddr: &[u8]) -> String {
    chaddr
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
