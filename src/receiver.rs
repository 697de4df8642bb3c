//! Receiver-side gap tracking, cumulative-ack advance, and SACK construction.

use std::net::SocketAddr;

use crate::io::RandomAccessSink;
use crate::segment::Segmenter;
use crate::wire;
use crate::Error;

/// Width of the SACK mask: segments `cum_ack+1 ..= cum_ack+64` get a bit.
const SACK_WIDTH: u32 = 64;

/// Outcome of feeding a packet to [`ReceiverState`]: either nothing (the
/// packet was discarded per §4.3/§4.1), or an ACK to send back plus whether
/// the session has reached its terminal state.
pub struct Reply {
    pub ack: Vec<u8>,
    pub terminal: bool,
}

/// Tracks which segments have been durably placed in the sink, the
/// cumulative ack, and the handshake peer for a single receive session.
pub struct ReceiverState<S: RandomAccessSink> {
    segmenter: Segmenter,
    have: Vec<bool>, // index 0 unused; 1..=N
    cum_ack: u32,
    peer: SocketAddr,
    sink: S,
    received: u64,
    terminal: bool,
}

impl<S: RandomAccessSink> ReceiverState<S> {
    /// Handles the first accepted START: allocates the gap bitmap, opens
    /// the sink pre-sized to `total_len`, and returns the state plus the
    /// ACK to send. `open_sink` is given the negotiated total length.
    pub fn start(
        peer: SocketAddr,
        total_len: u64,
        payload_max: u32,
        open_sink: impl FnOnce(u64) -> std::io::Result<S>,
    ) -> Result<(Self, Vec<u8>), Error> {
        let segmenter = Segmenter::new(total_len, payload_max)?;
        let sink = open_sink(total_len)?;
        let state = ReceiverState {
            segmenter,
            have: vec![false; segmenter.num_segments() as usize + 1],
            cum_ack: 0,
            peer,
            sink,
            received: 0,
            terminal: false,
        };
        let ack = wire::encode_ack(0, 0);
        Ok((state, ack))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn cum_ack(&self) -> u32 {
        self.cum_ack
    }

    pub fn num_segments(&self) -> u32 {
        self.segmenter.num_segments()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn total_len(&self) -> u64 {
        self.segmenter.total_len()
    }

    /// Re-handles a duplicate START from the already-pinned peer:
    /// idempotent, no reallocation, just re-emits the current cumulative
    /// ACK. Returns `None` for a START from any other peer.
    pub fn restart(&self, from: SocketAddr) -> Option<Vec<u8>> {
        if from != self.peer {
            return None;
        }
        Some(wire::encode_ack(self.cum_ack, self.sack_mask()))
    }

    /// Handles a DATA packet. Returns `None` if the packet is from a
    /// different peer than the one pinned at handshake, or if it is out
    /// of range and must be discarded per §4.3. Otherwise always replies
    /// with an ACK, even for a segment already received.
    pub fn data(&mut self, from: SocketAddr, seq: u32, payload: &[u8]) -> Option<Vec<u8>> {
        if from != self.peer {
            return None;
        }
        if seq == 0 || seq > self.segmenter.num_segments() {
            return None;
        }
        if payload.len() as u32 > self.segmenter.payload_max() {
            return None;
        }

        if !self.have[seq as usize] {
            let offset = self.segmenter.offset(seq);
            // A transient write error here is reported up; the caller
            // decides whether to retry (the peer will resend on timeout).
            if let Err(e) = self.sink.write_at(offset, payload) {
                tracing::warn!(seq, error = %e, "failed to write segment to sink");
                return None;
            }
            self.have[seq as usize] = true;
            self.received += payload.len() as u64;

            while self.cum_ack < self.segmenter.num_segments()
                && self.have[(self.cum_ack + 1) as usize]
            {
                self.cum_ack += 1;
            }
        }

        Some(wire::encode_ack(self.cum_ack, self.sack_mask()))
    }

    /// Handles an END packet. The sequence number is informational only
    /// (§9 open question) and is not checked. Marks the session terminal
    /// and synchronizes the sink once `cum_ack` has reached `N`.
    pub fn end(&mut self, from: SocketAddr) -> Option<Reply> {
        if from != self.peer {
            return None;
        }
        let ack = wire::encode_ack(self.cum_ack, self.sack_mask());
        if self.cum_ack == self.segmenter.num_segments() {
            if let Err(e) = self.sink.sync() {
                tracing::warn!(error = %e, "failed to sync sink on termination");
            }
            self.terminal = true;
        }
        Some(Reply {
            ack,
            terminal: self.terminal,
        })
    }

    fn sack_mask(&self) -> u64 {
        let mut mask = 0u64;
        for i in 0..SACK_WIDTH {
            let s = self.cum_ack + 1 + i;
            if s <= self.segmenter.num_segments() && self.have[s as usize] {
                mask |= 1u64 << i;
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::rc::Rc;

    #[derive(Clone)]
    struct MemSink(Rc<RefCell<Vec<u8>>>);

    impl RandomAccessSink for MemSink {
        fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
            let mut buf = self.0.borrow_mut();
            buf[offset as usize..offset as usize + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn start(total_len: u64, payload_max: u32) -> (ReceiverState<MemSink>, Rc<RefCell<Vec<u8>>>) {
        let backing = Rc::new(RefCell::new(vec![0u8; total_len as usize]));
        let backing2 = backing.clone();
        let (state, _ack) =
            ReceiverState::start(peer(1), total_len, payload_max, move |_len| {
                Ok(MemSink(backing2))
            })
            .unwrap();
        (state, backing)
    }

    #[test]
    fn reordered_segments_land_at_correct_offsets() {
        let (mut recv, backing) = start(9, 3);
        recv.data(peer(1), 3, b"GHI").unwrap();
        assert_eq!(recv.cum_ack(), 0);
        recv.data(peer(1), 1, b"ABC").unwrap();
        assert_eq!(recv.cum_ack(), 1);
        recv.data(peer(1), 2, b"DEF").unwrap();
        assert_eq!(recv.cum_ack(), 3);
        assert_eq!(&backing.borrow()[..], b"ABCDEFGHI");
    }

    #[test]
    fn duplicate_data_still_acks_but_does_not_double_count() {
        let (mut recv, _backing) = start(6, 3);
        recv.data(peer(1), 1, b"ABC").unwrap();
        assert_eq!(recv.received(), 3);
        recv.data(peer(1), 1, b"ABC").unwrap();
        assert_eq!(recv.received(), 3);
        assert_eq!(recv.cum_ack(), 1);
    }

    #[test]
    fn data_from_other_peer_is_ignored() {
        let (mut recv, _backing) = start(3, 3);
        assert!(recv.data(peer(2), 1, b"ABC").is_none());
        assert_eq!(recv.cum_ack(), 0);
    }

    #[test]
    fn out_of_range_sequence_is_discarded() {
        let (mut recv, _backing) = start(3, 3);
        assert!(recv.data(peer(1), 0, b"ABC").is_none());
        assert!(recv.data(peer(1), 5, b"ABC").is_none());
    }

    #[test]
    fn end_before_complete_is_not_terminal() {
        let (mut recv, _backing) = start(6, 3);
        recv.data(peer(1), 1, b"ABC").unwrap();
        let reply = recv.end(peer(1)).unwrap();
        assert!(!reply.terminal);
    }

    #[test]
    fn end_after_complete_is_terminal() {
        let (mut recv, _backing) = start(6, 3);
        recv.data(peer(1), 1, b"ABC").unwrap();
        recv.data(peer(1), 2, b"DEF").unwrap();
        let reply = recv.end(peer(1)).unwrap();
        assert!(reply.terminal);
        assert!(recv.is_terminal());
    }

    #[test]
    fn sack_mask_reflects_gaps_beyond_cum_ack() {
        let (mut recv, _backing) = start(12, 3);
        recv.data(peer(1), 2, b"DEF").unwrap();
        let ack = recv.data(peer(1), 4, b"JKL").unwrap();
        let pkt = wire::decode(&ack).unwrap();
        let (cum, mask) = wire::parse_ack_payload(pkt.payload).unwrap();
        assert_eq!(cum, 0);
        assert_eq!(mask, 0b1010); // bit 1 (seq 2) and bit 3 (seq 4)
    }

    #[test]
    fn sack_mask_saturates_short_of_its_own_first_slot() {
        // Segment 1 is the only gap; every segment 2..=64 (everything the
        // 64-wide mask can name other than its own first slot, which by
        // construction mirrors cum_ack and can't be set while seq 1 is
        // missing) has been received out of order.
        let (mut recv, _backing) = start(70, 1);
        for seq in 2..=64u32 {
            recv.data(peer(1), seq, &[b'x']).unwrap();
        }
        let ack = recv.data(peer(1), 65, &[b'x']).unwrap();
        let pkt = wire::decode(&ack).unwrap();
        let (cum, mask) = wire::parse_ack_payload(pkt.payload).unwrap();
        assert_eq!(cum, 0); // seq 1 itself is still missing
        assert_eq!(mask, u64::MAX << 1); // bits 1..=63 (seq 2..=64) all set
    }

    #[test]
    fn duplicate_start_from_same_peer_is_idempotent() {
        let (mut recv, _backing) = start(6, 3);
        recv.data(peer(1), 1, b"ABC").unwrap();
        let ack = recv.restart(peer(1)).unwrap();
        let pkt = wire::decode(&ack).unwrap();
        let (cum, _mask) = wire::parse_ack_payload(pkt.payload).unwrap();
        assert_eq!(cum, 1);
        assert_eq!(recv.cum_ack(), 1); // re-ack only, no reallocation/reset
    }

    #[test]
    fn start_from_other_peer_during_active_session_is_ignored() {
        let (recv, _backing) = start(6, 3);
        assert!(recv.restart(peer(2)).is_none());
    }
}
