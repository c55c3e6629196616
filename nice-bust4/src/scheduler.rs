//! Single-in-flight transmit queue.
//!
//! Frames leave in FIFO order, one at a time. The slot is freed when the
//! device answers the frame in flight, when the bus has been quiet for the
//! response timeout after it went out, or when the hard wait limit since the
//! send has passed. A frame that times out is dropped, never resent.
//!
//! Replies are paired by [`ReplyKey`]: a late answer to an earlier request
//! does not release the current one.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, info, trace, warn};

use crate::error::{Bust4Error, Result};
use crate::message::ReplyKey;
use crate::transport::BusTransport;

/// Transmit-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub frames_sent: u64,
    pub acknowledged: u64,
    pub unmatched_replies: u64,
    pub timeouts: u64,
    pub dropped_full: u64,
    pub transport_errors: u64,
}

pub struct TransmitScheduler {
    queue: VecDeque<Bytes>,
    max_len: usize,
    ready_to_tx: bool,
    sent_at: Option<Instant>,
    /// Reply the in-flight frame waits for; `None` accepts any
    expected: Option<ReplyKey>,
    last_activity: Option<Instant>,
    response_timeout: Duration,
    max_response_wait: Duration,
    stats: SchedulerStats,
}

impl TransmitScheduler {
    pub fn new(response_timeout: Duration, max_response_wait: Duration, max_len: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_len),
            max_len,
            ready_to_tx: true,
            sent_at: None,
            expected: None,
            last_activity: None,
            response_timeout,
            max_response_wait: max_response_wait.max(response_timeout),
            stats: SchedulerStats::default(),
        }
    }

    /// Append a frame to the back of the queue.
    pub fn enqueue(&mut self, frame: Bytes) -> Result<()> {
        if self.queue.len() >= self.max_len {
            self.stats.dropped_full += 1;
            warn!(
                "TX queue full ({} frames), dropping {:02X?}",
                self.max_len,
                &frame[..]
            );
            return Err(Bust4Error::QueueFull(self.max_len));
        }
        self.queue.push_back(frame);
        trace!("QUEUE: {} frames pending", self.queue.len());
        Ok(())
    }

    /// Send the front frame if the slot is free. Returns true when a frame
    /// went out.
    pub fn try_send<T: BusTransport + ?Sized>(&mut self, bus: &mut T, now: Instant) -> Result<bool> {
        if !self.ready_to_tx {
            return Ok(false);
        }
        let Some(frame) = self.queue.pop_front() else {
            return Ok(false);
        };

        if let Err(err) = bus.send_frame(&frame) {
            self.stats.transport_errors += 1;
            warn!("TX failed, frame dropped: {} ({:02X?})", err, &frame[..]);
            return Err(err);
        }

        info!("TX frame ({} bytes): {:02X?}", frame.len(), &frame[..]);
        self.stats.frames_sent += 1;
        self.ready_to_tx = false;
        self.sent_at = Some(now);
        self.expected = ReplyKey::expected_for(&frame);
        Ok(true)
    }

    /// Free the slot if `reply` answers the frame in flight. Returns false
    /// when nothing was in flight or the reply belongs to another request.
    pub fn acknowledge(&mut self, reply: ReplyKey) -> bool {
        if self.ready_to_tx {
            trace!("Reply {:?} with nothing in flight", reply);
            return false;
        }
        if let Some(expected) = self.expected {
            if expected != reply {
                self.stats.unmatched_replies += 1;
                debug!("Reply {:?} does not match in-flight {:?}", reply, expected);
                return false;
            }
        }
        self.ready_to_tx = true;
        self.sent_at = None;
        self.expected = None;
        self.stats.acknowledged += 1;
        debug!("In-flight frame acknowledged, {} pending", self.queue.len());
        true
    }

    /// Record that a byte was seen on the bus.
    pub fn note_bus_activity(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// Drop the in-flight frame once the bus has been quiet for the response
    /// timeout since it was sent, or once the hard wait limit has passed
    /// regardless of other traffic.
    pub fn check_timeout(&mut self, now: Instant) -> Option<Bust4Error> {
        let sent_at = self.sent_at?;
        let quiet_since = match self.last_activity {
            Some(activity) if activity > sent_at => activity,
            _ => sent_at,
        };
        let limit = if now.saturating_duration_since(sent_at) >= self.max_response_wait {
            self.max_response_wait
        } else if now.saturating_duration_since(quiet_since) >= self.response_timeout {
            self.response_timeout
        } else {
            return None;
        };

        self.ready_to_tx = true;
        self.sent_at = None;
        self.expected = None;
        self.stats.timeouts += 1;
        debug!(
            "No response within {:?}, slot freed ({} pending)",
            limit,
            self.queue.len()
        );
        Some(Bust4Error::ResponseTimeout {
            timeout_ms: limit.as_millis() as u64,
        })
    }

    pub fn ready_to_tx(&self) -> bool {
        self.ready_to_tx
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BusAddress;
    use crate::message::{Message, Packet};
    use crate::transport::RecordingBus;

    const TIMEOUT: Duration = Duration::from_millis(100);
    const MAX_WAIT: Duration = Duration::from_millis(500);

    fn frame(tag: u8) -> Bytes {
        Bytes::from(vec![0x55, tag])
    }

    #[test]
    fn test_fifo_with_acknowledgement() {
        let mut sched = TransmitScheduler::new(TIMEOUT, MAX_WAIT, 8);
        let mut bus = RecordingBus::new();
        let now = Instant::now();

        for tag in [0xA, 0xB, 0xC] {
            sched.enqueue(frame(tag)).unwrap();
        }

        assert!(sched.try_send(&mut bus, now).unwrap());
        assert!(!sched.ready_to_tx());
        // slot busy, nothing else goes out
        assert!(!sched.try_send(&mut bus, now).unwrap());
        assert_eq!(bus.sent().len(), 1);

        assert!(sched.acknowledge(ReplyKey::Command(0x03)));
        assert!(sched.try_send(&mut bus, now).unwrap());
        assert_eq!(bus.sent(), &[frame(0xA), frame(0xB)]);
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn test_timeout_frees_slot_without_retry() {
        let mut sched = TransmitScheduler::new(TIMEOUT, MAX_WAIT, 8);
        let mut bus = RecordingBus::new();
        let start = Instant::now();

        sched.enqueue(frame(1)).unwrap();
        sched.enqueue(frame(2)).unwrap();
        sched.try_send(&mut bus, start).unwrap();

        assert!(sched.check_timeout(start + Duration::from_millis(50)).is_none());
        let err = sched.check_timeout(start + TIMEOUT).unwrap();
        assert_eq!(err, Bust4Error::ResponseTimeout { timeout_ms: 100 });
        assert!(sched.ready_to_tx());

        sched.try_send(&mut bus, start + TIMEOUT).unwrap();
        assert_eq!(bus.sent(), &[frame(1), frame(2)]);
        assert_eq!(sched.stats().timeouts, 1);
    }

    #[test]
    fn test_bus_activity_extends_timeout() {
        let mut sched = TransmitScheduler::new(TIMEOUT, MAX_WAIT, 8);
        let mut bus = RecordingBus::new();
        let start = Instant::now();

        sched.enqueue(frame(1)).unwrap();
        sched.try_send(&mut bus, start).unwrap();
        sched.note_bus_activity(start + Duration::from_millis(80));

        assert!(sched.check_timeout(start + Duration::from_millis(150)).is_none());
        assert!(sched.check_timeout(start + Duration::from_millis(180)).is_some());
    }

    #[test]
    fn test_ack_without_in_flight_is_noop() {
        let mut sched = TransmitScheduler::new(TIMEOUT, MAX_WAIT, 8);
        assert!(!sched.acknowledge(ReplyKey::Status));
        assert_eq!(sched.stats().acknowledged, 0);
    }

    #[test]
    fn test_queue_full() {
        let mut sched = TransmitScheduler::new(TIMEOUT, MAX_WAIT, 2);
        sched.enqueue(frame(1)).unwrap();
        sched.enqueue(frame(2)).unwrap();
        assert_eq!(sched.enqueue(frame(3)), Err(Bust4Error::QueueFull(2)));
        assert_eq!(sched.len(), 2);
    }

    #[test]
    fn test_transport_error_keeps_slot_free() {
        let mut sched = TransmitScheduler::new(TIMEOUT, MAX_WAIT, 4);
        let mut bus = RecordingBus::new();
        bus.set_failing(true);
        sched.enqueue(frame(1)).unwrap();

        assert!(sched.try_send(&mut bus, Instant::now()).is_err());
        assert!(sched.ready_to_tx());
        assert!(sched.is_empty());
    }

    #[test]
    fn test_hard_limit_despite_traffic() {
        let mut sched = TransmitScheduler::new(TIMEOUT, MAX_WAIT, 8);
        let mut bus = RecordingBus::new();
        let start = Instant::now();

        sched.enqueue(frame(1)).unwrap();
        sched.try_send(&mut bus, start).unwrap();

        let mut t = start;
        while t < start + MAX_WAIT {
            assert!(sched.check_timeout(t).is_none());
            t += Duration::from_millis(50);
            sched.note_bus_activity(t);
        }
        let err = sched.check_timeout(start + MAX_WAIT).unwrap();
        assert_eq!(err, Bust4Error::ResponseTimeout { timeout_ms: 500 });
        assert!(sched.ready_to_tx());
    }

    #[test]
    fn test_reply_must_match_in_flight() {
        let mut sched = TransmitScheduler::new(TIMEOUT, MAX_WAIT, 8);
        let mut bus = RecordingBus::new();
        let open = Packet::new(
            BusAddress::BROADCAST,
            BusAddress::CONTROLLER,
            Message::Control { command: 0x03 },
        )
        .encode()
        .unwrap();
        sched.enqueue(open.into_bytes()).unwrap();
        sched.try_send(&mut bus, Instant::now()).unwrap();

        assert!(!sched.acknowledge(ReplyKey::Info { submenu: 0x11 }));
        assert!(!sched.acknowledge(ReplyKey::Status));
        assert!(!sched.ready_to_tx());
        assert_eq!(sched.stats().unmatched_replies, 2);

        assert!(sched.acknowledge(ReplyKey::Command(0x03)));
        assert!(sched.ready_to_tx());
    }
}
