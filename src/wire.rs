//! Fixed 7-byte header + payload framing for the reliability protocol.
//!
//! All multi-byte integers are big-endian on the wire regardless of host
//! order; `u32`/`u64::{to,from}_be_bytes` give us that for free, so there is
//! no hand-rolled `htonll` here.

pub const HEADER_LEN: usize = 7;
pub const ACK_PAYLOAD_LEN: usize = 12;
pub const START_PAYLOAD_LEN: usize = 8;

const TYPE_DATA: u8 = 0x01;
const TYPE_START: u8 = 0x02;
const TYPE_END: u8 = 0x03;
const TYPE_ACK: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data,
    Start,
    End,
    Ack,
}

impl PacketType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            TYPE_DATA => Some(PacketType::Data),
            TYPE_START => Some(PacketType::Start),
            TYPE_END => Some(PacketType::End),
            TYPE_ACK => Some(PacketType::Ack),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            PacketType::Data => TYPE_DATA,
            PacketType::Start => TYPE_START,
            PacketType::End => TYPE_END,
            PacketType::Ack => TYPE_ACK,
        }
    }
}

/// A decoded datagram: header fields plus a borrowed view of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket<'a> {
    pub kind: PacketType,
    pub seq: u32,
    pub payload: &'a [u8],
}

/// Decodes a header-prefixed datagram.
///
/// Rejects anything shorter than [`HEADER_LEN`] or whose declared `len`
/// would run past the end of `datagram`. An unrecognized `type` byte is
/// silently dropped (returns `None`), matching a peer that should simply
/// ignore packets from a future protocol version. No other semantic
/// checks (seq ranges, payload shape) happen here — that's the state
/// machines' job.
pub fn decode(datagram: &[u8]) -> Option<RawPacket<'_>> {
    if datagram.len() < HEADER_LEN {
        return None;
    }
    let kind = PacketType::from_byte(datagram[0])?;
    let seq = u32::from_be_bytes(datagram[1..5].try_into().unwrap());
    let len = u16::from_be_bytes(datagram[5..7].try_into().unwrap()) as usize;
    if HEADER_LEN + len > datagram.len() {
        return None;
    }
    Some(RawPacket {
        kind,
        seq,
        payload: &datagram[HEADER_LEN..HEADER_LEN + len],
    })
}

fn header(kind: PacketType, seq: u32, len: u16) -> [u8; HEADER_LEN] {
    let mut h = [0u8; HEADER_LEN];
    h[0] = kind.to_byte();
    h[1..5].copy_from_slice(&seq.to_be_bytes());
    h[5..7].copy_from_slice(&len.to_be_bytes());
    h
}

pub fn encode_start(total_len: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + START_PAYLOAD_LEN);
    out.extend_from_slice(&header(PacketType::Start, 0, START_PAYLOAD_LEN as u16));
    out.extend_from_slice(&total_len.to_be_bytes());
    out
}

pub fn encode_data(seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header(PacketType::Data, seq, payload.len() as u16));
    out.extend_from_slice(payload);
    out
}

pub fn encode_end(seq: u32) -> Vec<u8> {
    header(PacketType::End, seq, 0).to_vec()
}

pub fn encode_ack(cum_ack: u32, sack_mask: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + ACK_PAYLOAD_LEN);
    out.extend_from_slice(&header(PacketType::Ack, 0, ACK_PAYLOAD_LEN as u16));
    out.extend_from_slice(&cum_ack.to_be_bytes());
    out.extend_from_slice(&sack_mask.to_be_bytes());
    out
}

/// Parses a START payload (the 8-byte big-endian total transfer length).
pub fn parse_start_payload(payload: &[u8]) -> Option<u64> {
    let bytes: [u8; START_PAYLOAD_LEN] = payload.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Parses an ACK payload into `(cum_ack, sack_mask)`.
pub fn parse_ack_payload(payload: &[u8]) -> Option<(u32, u64)> {
    if payload.len() != ACK_PAYLOAD_LEN {
        return None;
    }
    let cum_ack = u32::from_be_bytes(payload[0..4].try_into().unwrap());
    let sack_mask = u64::from_be_bytes(payload[4..12].try_into().unwrap());
    Some((cum_ack, sack_mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_short_datagram() {
        assert!(decode(&[0x01, 0, 0, 0, 1]).is_none());
    }

    #[test]
    fn decode_rejects_oversized_len() {
        let mut raw = header(PacketType::Data, 1, 10).to_vec();
        raw.extend_from_slice(&[0u8; 3]); // only 3 bytes of payload, header claims 10
        assert!(decode(&raw).is_none());
    }

    #[test]
    fn decode_drops_unknown_type() {
        let mut raw = vec![0xFFu8];
        raw.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        assert!(decode(&raw).is_none());
    }

    #[test]
    fn start_round_trips() {
        let raw = encode_start(123_456);
        let pkt = decode(&raw).unwrap();
        assert_eq!(pkt.kind, PacketType::Start);
        assert_eq!(pkt.seq, 0);
        assert_eq!(parse_start_payload(pkt.payload), Some(123_456));
    }

    #[test]
    fn data_round_trips_with_exact_payload() {
        let raw = encode_data(7, b"hello");
        let pkt = decode(&raw).unwrap();
        assert_eq!(pkt.kind, PacketType::Data);
        assert_eq!(pkt.seq, 7);
        assert_eq!(pkt.payload, b"hello");
    }

    #[test]
    fn ack_round_trips_with_sack_mask() {
        let raw = encode_ack(4, 0b101);
        let pkt = decode(&raw).unwrap();
        assert_eq!(pkt.kind, PacketType::Ack);
        assert_eq!(parse_ack_payload(pkt.payload), Some((4, 0b101)));
    }

    #[test]
    fn end_has_empty_payload() {
        let raw = encode_end(42);
        let pkt = decode(&raw).unwrap();
        assert_eq!(pkt.kind, PacketType::End);
        assert_eq!(pkt.seq, 42);
        assert!(pkt.payload.is_empty());
    }
}
