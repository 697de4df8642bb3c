//! Reliable file transfer over UDP: a fixed-window selective-repeat
//! protocol with selective acknowledgment (SACK), split into a wire codec,
//! a segmenter, and independent sender/receiver state machines. The two
//! `rft-send`/`rft-recv` binaries drive these over real sockets; the
//! state machines themselves know nothing about sockets or CLI flags.

mod err;
pub mod io;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod wire;

pub use err::Error;

/// Header overhead accounted for when deriving payload size from MTU:
/// the conventional "IP+UDP = 28 bytes" figure, on top of our own
/// 7-byte header.
pub const IP_UDP_OVERHEAD: u32 = 28;

/// Payload-size floor below which a degenerate MTU would shrink segments
/// to the point of defeating the protocol's own overhead.
pub const MIN_PAYLOAD: u32 = 512;

/// Derives the per-segment payload size `P` from an MTU, per §4.1/§6:
/// `P = max(mtu - 28 - HEADER_LEN, MIN_PAYLOAD)`.
pub fn payload_size(mtu: u32) -> u32 {
    mtu.saturating_sub(IP_UDP_OVERHEAD)
        .saturating_sub(wire::HEADER_LEN as u32)
        .max(MIN_PAYLOAD)
}
