//! Byte-at-a-time frame accumulator.
//!
//! The receiver waits for the start byte, reads the declared length from the
//! next byte and collects exactly that many bytes before validating. A frame
//! that fails validation is dropped whole; its bytes are never rescanned for a
//! new start byte. A partial frame that stalls longer than the liveness
//! timeout is discarded.
//!
//! Validation happens inside the call that delivers the final byte, and the
//! receiver is back in `Idle` before that call returns, whether the frame was
//! accepted or rejected.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use log::{debug, info, trace, warn};

use crate::codes::START_CODE;
use crate::error::{Bust4Error, Result};
use crate::frame::{Frame, MAX_FRAME_LEN, MIN_FRAME_LEN, OFFSET_LEN};

/// Receiver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Discarding bytes until a start byte arrives
    Idle,
    /// Collecting the declared number of bytes
    Accumulating,
}

/// Receive-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub frames_ok: u64,
    pub malformed: u64,
    pub liveness_timeouts: u64,
    /// Bytes dropped while idle (breaks, noise, foreign traffic fragments)
    pub discarded_bytes: u64,
}

pub struct FrameReceiver {
    state: ReceiverState,
    buffer: BytesMut,
    expected_len: usize,
    last_byte: Option<Instant>,
    rx_timeout: Duration,
    stats: ReceiverStats,
}

impl FrameReceiver {
    pub fn new(rx_timeout: Duration) -> Self {
        Self {
            state: ReceiverState::Idle,
            buffer: BytesMut::with_capacity(MAX_FRAME_LEN),
            expected_len: 0,
            last_byte: None,
            rx_timeout,
            stats: ReceiverStats::default(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one byte.
    ///
    /// Returns `Some(Ok(frame))` when a frame completed and validated,
    /// `Some(Err(..))` when a frame completed (or its length byte arrived) and
    /// was rejected, `None` otherwise.
    pub fn push(&mut self, byte: u8, now: Instant) -> Option<Result<Frame>> {
        self.check_timeout(now);
        self.last_byte = Some(now);

        match self.state {
            ReceiverState::Idle => {
                if byte == START_CODE {
                    self.buffer.clear();
                    self.buffer.extend_from_slice(&[byte]);
                    self.expected_len = 0;
                    self.state = ReceiverState::Accumulating;
                    trace!("RX start byte, accumulating");
                } else {
                    self.stats.discarded_bytes += 1;
                    trace!("RX_DISCARD: 0x{:02X} while idle", byte);
                }
                None
            }
            ReceiverState::Accumulating => {
                self.buffer.extend_from_slice(&[byte]);

                if self.buffer.len() == OFFSET_LEN + 1 {
                    let total = byte as usize + 3;
                    if total < MIN_FRAME_LEN {
                        warn!(
                            "Declared length {} below minimum frame size, resyncing",
                            byte
                        );
                        return Some(Err(self.reject(Bust4Error::malformed(format!(
                            "declared length {} too short",
                            byte
                        )))));
                    }
                    self.expected_len = total;
                    return None;
                }

                if self.buffer.len() < self.expected_len {
                    return None;
                }

                Some(self.complete())
            }
        }
    }

    /// Discard a stalled partial frame. Returns true when one was dropped.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if self.state != ReceiverState::Accumulating {
            return false;
        }
        let Some(last) = self.last_byte else {
            return false;
        };
        if now.saturating_duration_since(last) <= self.rx_timeout {
            return false;
        }

        debug!(
            "RX liveness timeout after {:?}, dropping {} partial bytes: {:02X?}",
            now.saturating_duration_since(last),
            self.buffer.len(),
            &self.buffer[..]
        );
        self.stats.liveness_timeouts += 1;
        self.reset();
        true
    }

    /// Drop any partial frame and go idle.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_len = 0;
        self.state = ReceiverState::Idle;
    }

    fn complete(&mut self) -> Result<Frame> {
        let bytes = self.buffer.split().freeze();
        self.expected_len = 0;
        self.state = ReceiverState::Idle;

        match Frame::parse(bytes.clone()) {
            Ok(frame) => {
                self.stats.frames_ok += 1;
                info!("RX frame ({} bytes): {:02X?}", bytes.len(), &bytes[..]);
                Ok(frame)
            }
            Err(err) => {
                warn!("RX frame rejected: {}", err);
                warn!("  Frame raw ({} bytes): {:02X?}", bytes.len(), &bytes[..]);
                self.stats.malformed += 1;
                Err(err)
            }
        }
    }

    fn reject(&mut self, err: Bust4Error) -> Bust4Error {
        self.stats.malformed += 1;
        self.reset();
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SBS: [u8; 15] = [
        0x55, 0x0C, 0x00, 0xFF, 0x00, 0x66, 0x01, 0x05, 0x9D, 0x01, 0x82, 0x01, 0x64, 0xE6, 0x0C,
    ];

    fn feed(rx: &mut FrameReceiver, bytes: &[u8], now: Instant) -> Vec<Result<Frame>> {
        bytes.iter().filter_map(|b| rx.push(*b, now)).collect()
    }

    #[test]
    fn test_single_frame() {
        let mut rx = FrameReceiver::new(Duration::from_millis(50));
        let now = Instant::now();

        let mut results = feed(&mut rx, &SBS[..14], now);
        assert!(results.is_empty());
        assert_eq!(rx.state(), ReceiverState::Accumulating);

        results.extend(feed(&mut rx, &SBS[14..], now));
        assert_eq!(results.len(), 1);
        let frame = results.remove(0).unwrap();
        assert_eq!(frame.as_bytes(), &SBS);
        assert_eq!(rx.state(), ReceiverState::Idle);
        assert_eq!(rx.stats().frames_ok, 1);
    }

    #[test]
    fn test_leading_break_and_noise_discarded() {
        let mut rx = FrameReceiver::new(Duration::from_millis(50));
        let now = Instant::now();
        let mut stream = vec![0x00, 0x13, 0xFF];
        stream.extend_from_slice(&SBS);

        let results = feed(&mut rx, &stream, now);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(rx.stats().discarded_bytes, 3);
    }

    #[test]
    fn test_start_byte_inside_frame_is_data() {
        // crc2 == 0x55 must not restart the frame
        let body = [0x01, 0x82, 0x01, 0xD7];
        let frame = Frame::build(
            crate::frame::BusAddress::BROADCAST,
            crate::frame::BusAddress::CONTROLLER,
            0x01,
            &body,
        )
        .unwrap();
        assert_eq!(frame.as_bytes()[13], 0x55);

        let mut rx = FrameReceiver::new(Duration::from_millis(50));
        let results = feed(&mut rx, frame.as_bytes(), Instant::now());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &frame);
    }

    #[test]
    fn test_short_declared_length_rejected_early() {
        let mut rx = FrameReceiver::new(Duration::from_millis(50));
        let now = Instant::now();
        let results = feed(&mut rx, &[0x55, 0x03], now);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Bust4Error::MalformedFrame { .. })));
        assert_eq!(rx.state(), ReceiverState::Idle);
    }

    #[test]
    fn test_liveness_timeout_discards_partial() {
        let mut rx = FrameReceiver::new(Duration::from_millis(50));
        let start = Instant::now();
        feed(&mut rx, &SBS[..6], start);
        assert_eq!(rx.buffered(), 6);

        assert!(!rx.check_timeout(start + Duration::from_millis(20)));
        assert!(rx.check_timeout(start + Duration::from_millis(60)));
        assert_eq!(rx.state(), ReceiverState::Idle);
        assert_eq!(rx.buffered(), 0);
        assert_eq!(rx.stats().liveness_timeouts, 1);

        let later = start + Duration::from_millis(100);
        let results = feed(&mut rx, &SBS, later);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_stalled_frame_restarts_on_next_byte() {
        let mut rx = FrameReceiver::new(Duration::from_millis(50));
        let start = Instant::now();
        feed(&mut rx, &SBS[..9], start);

        let results = feed(&mut rx, &SBS, start + Duration::from_millis(200));
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_final_byte_returns_to_idle() {
        let mut rx = FrameReceiver::new(Duration::from_millis(50));
        let now = Instant::now();

        let mut corrupted = SBS;
        corrupted[13] ^= 0xFF;
        let results = feed(&mut rx, &corrupted, now);
        assert!(matches!(results[..], [Err(Bust4Error::MalformedFrame { .. })]));
        assert_eq!(rx.state(), ReceiverState::Idle);
        assert_eq!(rx.buffered(), 0);

        // the next start byte opens a fresh frame straight away
        assert!(rx.push(START_CODE, now).is_none());
        assert_eq!(rx.state(), ReceiverState::Accumulating);
        assert_eq!(rx.buffered(), 1);
    }
}
