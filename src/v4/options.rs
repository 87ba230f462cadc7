//! The DHCP option area, kept as raw code/value pairs.
//!
//! Options are never decoded into typed values: the relay reads option 53 and
//! option 54 from their bytes and writes everything else back exactly as received.

use crate::error::Discard;
use bytes::{BufMut, Bytes, BytesMut};

pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
/// Offset of the magic cookie within a BOOTP message.
pub const COOKIE_OFFSET: usize = 236;
/// Offset of the first option, right after the cookie.
pub const OPTIONS_OFFSET: usize = 240;

pub const PAD: u8 = 0;
pub const END: u8 = 255;
pub const MESSAGE_TYPE: u8 = 53;
pub const SERVER_IDENTIFIER: u8 = 54;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOptions {
    entries: Vec<(u8, Bytes)>,
}

impl RawOptions {
    /// Walks the option area that follows the magic cookie.
    ///
    /// Pad bytes are skipped and parsing stops at the end option or at the end of
    /// the buffer. An option whose length runs past the buffer is malformed.
    pub fn parse(area: &[u8]) -> Result<Self, Discard> {
        let mut entries = Vec::new();
        let mut i = 0;

        while i < area.len() {
            let code = area[i];
            match code {
                PAD => {
                    i += 1;
                    continue;
                }
                END => break,
                _ => {}
            }

            let len = *area
                .get(i + 1)
                .ok_or_else(|| Discard::Malformed(format!("option {code} has no length")))?
                as usize;
            let value = area.get(i + 2..i + 2 + len).ok_or_else(|| {
                Discard::Malformed(format!("option {code} of length {len} is truncated"))
            })?;

            entries.push((code, Bytes::copy_from_slice(value)));
            i += 2 + len;
        }

        Ok(Self { entries })
    }

    /// Value of the last occurrence of `code`.
    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.entries
            .iter()
            .rev()
            .find(|(c, _)| *c == code)
            .map(|(_, value)| &value[..])
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.entries.iter().map(|(code, value)| (*code, &value[..]))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes every option in its received order, followed by the end option.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        for (code, value) in &self.entries {
            buf.put_u8(*code);
            // Values came off the wire behind a one-byte length.
            buf.put_u8(value.len() as u8);
            buf.put_slice(value);
        }
        buf.put_u8(END);
    }
}
