//! Sender-side per-segment state, window management, and RTO-driven
//! retransmission.

use std::time::{Duration, Instant};

use crate::io::RandomAccessSource;
use crate::segment::Segmenter;
use crate::wire;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    Init,
    Handshaking,
    Bulk,
    Draining,
    Done,
    Failed,
}

/// Per-segment state plus window/RTO bookkeeping for one outbound transfer.
///
/// `acked`, `tx_count`, and `last_sent` are parallel arrays indexed
/// `[1..=N]`; index 0 is unused. This mirrors the reference
/// implementation's layout and keeps each array a flat, cache-friendly
/// `Vec` rather than a struct-of-segments.
pub struct SenderState<Src: RandomAccessSource> {
    source: Src,
    segmenter: Segmenter,
    window: u32,
    rto: Duration,
    retries: u32,

    acked: Vec<bool>,
    tx_count: Vec<u32>,
    last_sent: Vec<Option<Instant>>,

    base: u32,
    next_to_send: u32,
    phase: SenderPhase,
}

impl<Src: RandomAccessSource> SenderState<Src> {
    pub fn new(
        source: Src,
        payload_max: u32,
        window: u32,
        rto: Duration,
        retries: u32,
    ) -> Result<Self, Error> {
        let total_len = source.len();
        let segmenter = Segmenter::new(total_len, payload_max)?;
        let n = segmenter.num_segments();
        Ok(SenderState {
            source,
            segmenter,
            window: window.clamp(1, 256),
            rto,
            retries,
            acked: vec![false; n as usize + 1],
            tx_count: vec![0; n as usize + 1],
            last_sent: vec![None; n as usize + 1],
            base: 1,
            next_to_send: 1,
            phase: SenderPhase::Init,
        })
    }

    pub fn total_len(&self) -> u64 {
        self.segmenter.total_len()
    }

    pub fn num_segments(&self) -> u32 {
        self.segmenter.num_segments()
    }

    pub fn phase(&self) -> SenderPhase {
        self.phase
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// True once every segment has been acknowledged (`base > N`) and the
    /// sender should move to the END handshake.
    pub fn is_bulk_complete(&self) -> bool {
        self.base > self.num_segments()
    }

    fn read_segment(&self, seq: u32) -> Result<Vec<u8>, Error> {
        let offset = self.segmenter.offset(seq);
        let len = self.segmenter.length(seq) as usize;
        let mut buf = vec![0u8; len];
        self.source.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Transitions `Init -> Handshaking` and returns the START packet.
    pub fn begin_handshake(&mut self) -> Vec<u8> {
        self.phase = SenderPhase::Handshaking;
        wire::encode_start(self.total_len())
    }

    /// Any ACK at all completes the handshake, regardless of its `cum_ack`.
    pub fn complete_handshake(&mut self) {
        if self.phase == SenderPhase::Handshaking {
            self.phase = SenderPhase::Bulk;
        }
    }

    /// Step 1 of the main loop: emit new segments while `next_to_send`
    /// is within the window, in ascending order.
    pub fn emit_window(&mut self, now: Instant) -> Result<Vec<Vec<u8>>, Error> {
        let mut out = Vec::new();
        while self.next_to_send <= self.num_segments()
            && self.next_to_send - self.base < self.window
        {
            let seq = self.next_to_send;
            let payload = self.read_segment(seq)?;
            out.push(wire::encode_data(seq, &payload));
            self.tx_count[seq as usize] += 1;
            self.last_sent[seq as usize] = Some(now);
            self.next_to_send += 1;
        }
        Ok(out)
    }

    /// Step 2 of the main loop: applies one decoded ACK, marking every
    /// segment up to `cum_ack` and every segment named by the SACK mask,
    /// then advancing `base` past any now-contiguous run.
    pub fn on_ack(&mut self, cum_ack: u32, sack_mask: u64) {
        let upper = cum_ack.min(self.num_segments());
        for s in self.base..=upper {
            self.acked[s as usize] = true;
        }
        for i in 0..64u32 {
            if sack_mask & (1u64 << i) != 0 {
                let s = cum_ack + 1 + i;
                if s <= self.num_segments() {
                    self.acked[s as usize] = true;
                }
            }
        }
        while self.base <= self.num_segments() && self.acked[self.base as usize] {
            self.base += 1;
        }
    }

    /// Step 3 of the main loop: retransmits any segment in
    /// `[base, next_to_send)` that is unacked and has been outstanding
    /// for at least `RTO`, walking in ascending sequence order. Fails the
    /// session the first time a segment's retry budget is exhausted.
    pub fn retransmit_stale(&mut self, now: Instant) -> Result<Vec<Vec<u8>>, Error> {
        let mut out = Vec::new();
        for s in self.base..self.next_to_send {
            if self.acked[s as usize] {
                continue;
            }
            if self.tx_count[s as usize] >= self.retries {
                return Err(Error::RetryExhausted { seq: s });
            }
            let due = match self.last_sent[s as usize] {
                Some(t) => now.duration_since(t) >= self.rto,
                None => true,
            };
            if due {
                let payload = self.read_segment(s)?;
                out.push(wire::encode_data(s, &payload));
                self.tx_count[s as usize] += 1;
                self.last_sent[s as usize] = Some(now);
            }
        }
        Ok(out)
    }

    /// Transitions `Bulk -> Draining` and returns the END packet.
    pub fn begin_drain(&mut self) -> Vec<u8> {
        self.phase = SenderPhase::Draining;
        wire::encode_end(self.num_segments() + 1)
    }

    /// Any ACK to the END packet completes the transfer.
    pub fn complete_drain(&mut self) {
        if self.phase == SenderPhase::Draining {
            self.phase = SenderPhase::Done;
        }
    }

    pub fn fail(&mut self) {
        self.phase = SenderPhase::Failed;
    }
}
