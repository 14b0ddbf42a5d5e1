//! Relay packet `0x0F01` exchanged with the map server when the relay runs
//! as a separate process.
//!
//! Layout (little-endian, 300 bytes):
//!
//! | offset | size | field      |
//! |--------|------|------------|
//! | 0      | 2    | packet id  |
//! | 2      | 24   | channel    |
//! | 26     | 24   | username   |
//! | 50     | 250  | message    |
//!
//! Text fields are NUL padded and always keep at least one terminator.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    Error, Result,
    message::{RelayMessage, truncate_bytes},
};

pub const RELAY_PACKET_ID: u16 = 0x0F01;
pub const NAME_LENGTH: usize = 24;
pub const MESSAGE_LENGTH: usize = 250;
pub const PACKET_LEN: usize = 2 + NAME_LENGTH * 2 + MESSAGE_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPacket {
    pub channel: String,
    pub username: String,
    pub message: String,
}

impl RelayPacket {
    pub fn new(
        channel: impl Into<String>,
        username: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            username: username.into(),
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PACKET_LEN);
        buf.put_u16_le(RELAY_PACKET_ID);
        put_fixed(&mut buf, &self.channel, NAME_LENGTH);
        put_fixed(&mut buf, &self.username, NAME_LENGTH);
        put_fixed(&mut buf, &self.message, MESSAGE_LENGTH);
        buf.freeze()
    }

    /// Decode one frame. Bytes past [`PACKET_LEN`] are ignored.
    pub fn decode(mut frame: &[u8]) -> Result<Self> {
        if frame.len() < PACKET_LEN {
            return Err(Error::invalid_input(format!(
                "short relay packet: {} of {PACKET_LEN} bytes",
                frame.len()
            )));
        }
        let id = frame.get_u16_le();
        if id != RELAY_PACKET_ID {
            return Err(Error::invalid_input(format!(
                "unexpected packet id {id:#06x}"
            )));
        }
        let channel = get_fixed(&mut frame, NAME_LENGTH);
        let username = get_fixed(&mut frame, NAME_LENGTH);
        let message = get_fixed(&mut frame, MESSAGE_LENGTH);
        Ok(Self {
            channel,
            username,
            message,
        })
    }

    /// The chat line carried by a packet the map server sent us.
    pub fn into_outbound(self) -> RelayMessage {
        RelayMessage::outbound(self.channel, self.username, self.message)
    }
}

impl From<&RelayMessage> for RelayPacket {
    fn from(msg: &RelayMessage) -> Self {
        Self::new(
            msg.source_channel.clone(),
            msg.author_display_name.clone(),
            msg.body.clone(),
        )
    }
}

fn put_fixed(buf: &mut BytesMut, value: &str, width: usize) {
    let mut value = value.to_string();
    truncate_bytes(&mut value, width - 1);
    buf.put_slice(value.as_bytes());
    buf.put_bytes(0, width - value.len());
}

fn get_fixed(buf: &mut &[u8], width: usize) -> String {
    let field = &buf[..width];
    let end = field.iter().position(|b| *b == 0).unwrap_or(width);
    let value = String::from_utf8_lossy(&field[..end]).into_owned();
    buf.advance(width);
    value
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_map_server() {
        let bytes = RelayPacket::new("support", "<dave>", "hi").encode();
        assert_eq!(bytes.len(), 300);
        assert_eq!(&bytes[..2], &[0x01, 0x0F]);
        assert_eq!(&bytes[2..9], b"support");
        assert_eq!(bytes[9], 0);
        assert_eq!(&bytes[26..32], b"<dave>");
        assert_eq!(&bytes[50..52], b"hi");
        assert!(bytes[52..].iter().all(|b| *b == 0));
    }

    #[test]
    fn decode_reads_fields() {
        let bytes = RelayPacket::new("trade", "Eve", "WTS sword").encode();
        let packet = RelayPacket::decode(&bytes).unwrap();
        assert_eq!(packet, RelayPacket::new("trade", "Eve", "WTS sword"));
        let msg = packet.into_outbound();
        assert_eq!(msg.source_channel, "trade");
        assert_eq!(msg.author_display_name, "Eve");
    }

    #[test]
    fn oversized_fields_keep_terminator() {
        let long_name = "n".repeat(40);
        let long_msg = "m".repeat(400);
        let bytes = RelayPacket::new("main", long_name, long_msg).encode();
        assert_eq!(bytes.len(), PACKET_LEN);
        assert_eq!(bytes[2 + NAME_LENGTH * 2 - 1], 0);
        assert_eq!(bytes[PACKET_LEN - 1], 0);

        let packet = RelayPacket::decode(&bytes).unwrap();
        assert_eq!(packet.username.len(), 23);
        assert_eq!(packet.message.len(), 249);
    }

    #[test]
    fn multibyte_truncation_is_valid_utf8() {
        let bytes = RelayPacket::new("main", "ü".repeat(20), "x").encode();
        let packet = RelayPacket::decode(&bytes).unwrap();
        assert_eq!(packet.username, "ü".repeat(11));
    }

    #[test]
    fn short_frame_rejected() {
        let err = RelayPacket::decode(&[0x01, 0x0F, 0x00]).unwrap_err();
        assert!(err.to_string().contains("short relay packet"));
    }

    #[test]
    fn wrong_id_rejected() {
        let mut bytes = RelayPacket::new("main", "a", "b").encode().to_vec();
        bytes[0] = 0xFF;
        let err = RelayPacket::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }
}
