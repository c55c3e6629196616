//! Cover state: motion, position and what to publish.

use log::{debug, trace};

use crate::codes::{status, ControlCommand};
use crate::error::{Bust4Error, Result};

/// Limits assumed until the drive reports its own
pub const DEFAULT_OPEN_LIMIT: u16 = 2048;
pub const DEFAULT_CLOSE_LIMIT: u16 = 0;

/// Drive motion as reported on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MotionState {
    #[default]
    Idle,
    Opening,
    Closing,
    Stopped,
    Opened,
    Closed,
    PartialOpened,
    /// Maneuver ended by the drive's work timer
    TimedOut,
}

impl MotionState {
    /// Map a status byte from INF_STATUS or STA replies.
    pub fn from_status(code: u8) -> Option<Self> {
        let state = match code {
            status::UNKNOWN | status::SEARCH_DONE => MotionState::Idle,
            status::STOPPED_IDLE | status::STOPPED => MotionState::Stopped,
            status::OPENING | status::WALKY_OPENING => MotionState::Opening,
            status::CLOSING | status::WALKY_CLOSING => MotionState::Closing,
            status::OPENED => MotionState::Opened,
            status::CLOSED => MotionState::Closed,
            status::END_TIME => MotionState::TimedOut,
            status::PART_OPENED => MotionState::PartialOpened,
            _ => return None,
        };
        Some(state)
    }

    pub fn is_moving(self) -> bool {
        matches!(self, MotionState::Opening | MotionState::Closing)
    }
}

/// State exposed to the host cover entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PublishedState {
    Open,
    Closed,
    Opening,
    Closing,
    Stopped,
    Partial,
}

/// A published cover snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverState {
    pub state: PublishedState,
    /// 0.0 closed .. 1.0 open
    pub position: f32,
}

impl CoverState {
    /// Position rounded to whole percent, the resolution changes are
    /// published at
    pub fn percent(&self) -> u8 {
        (self.position.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    fn same_as(&self, other: &CoverState) -> bool {
        self.state == other.state && self.percent() == other.percent()
    }
}

/// Capabilities reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverTraits {
    pub supports_position: bool,
    pub supports_stop: bool,
    pub supports_toggle: bool,
}

/// A control request from the host.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoverCall {
    pub stop: bool,
    pub toggle: bool,
    pub position: Option<f32>,
}

impl CoverCall {
    pub fn stop() -> Self {
        Self {
            stop: true,
            ..Self::default()
        }
    }

    pub fn position(position: f32) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn open() -> Self {
        Self::position(1.0)
    }

    pub fn close() -> Self {
        Self::position(0.0)
    }
}

/// Encoder position and limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTracker {
    pub current: u16,
    pub open_limit: u16,
    pub close_limit: u16,
    /// Maximum opening the encoder allows
    pub max_opening: u16,
    fraction: f32,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self {
            current: 0,
            open_limit: DEFAULT_OPEN_LIMIT,
            close_limit: DEFAULT_CLOSE_LIMIT,
            max_opening: 0,
            fraction: 0.0,
        }
    }
}

impl PositionTracker {
    pub fn fraction(&self) -> f32 {
        self.fraction
    }

    pub fn set_fraction(&mut self, fraction: f32) {
        self.fraction = fraction.clamp(0.0, 1.0);
    }

    /// Store a new encoder reading and recompute the fraction.
    ///
    /// The fraction is left alone while the limits are equal.
    pub fn update(&mut self, position: u16) -> f32 {
        self.current = position;
        if let Some(fraction) = self.fraction_of(position) {
            self.fraction = fraction;
        }
        self.fraction
    }

    pub fn fraction_of(&self, position: u16) -> Option<f32> {
        let span = i32::from(self.open_limit) - i32::from(self.close_limit);
        if span == 0 {
            return None;
        }
        let offset = i32::from(position) - i32::from(self.close_limit);
        Some((offset as f32 / span as f32).clamp(0.0, 1.0))
    }

    /// Encoder value for a fraction, if the limits describe a travel range
    pub fn target_for(&self, fraction: f32) -> Option<u16> {
        if self.open_limit <= self.close_limit {
            return None;
        }
        let span = f32::from(self.open_limit - self.close_limit);
        Some((span * fraction + f32::from(self.close_limit)).round() as u16)
    }
}

/// Stop point for a partial-position request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionHook {
    pub target: u16,
    pub opening: bool,
}

/// Motion, position and publish bookkeeping for one actuator.
#[derive(Debug, Clone)]
pub struct ActuatorState {
    motion: MotionState,
    tracker: PositionTracker,
    hook: Option<PositionHook>,
    last_published: Option<CoverState>,
    closed_threshold: f32,
}

impl ActuatorState {
    pub fn new(closed_threshold: f32) -> Self {
        Self {
            motion: MotionState::Idle,
            tracker: PositionTracker::default(),
            hook: None,
            last_published: None,
            closed_threshold,
        }
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PositionTracker {
        &mut self.tracker
    }

    pub fn hook(&self) -> Option<PositionHook> {
        self.hook
    }

    pub fn last_published(&self) -> Option<CoverState> {
        self.last_published
    }

    /// Apply an interpreted motion state.
    pub fn set_motion(&mut self, motion: MotionState) {
        if motion != self.motion {
            debug!("Motion {:?} -> {:?}", self.motion, motion);
        }
        self.motion = motion;
        match motion {
            MotionState::Opened => self.tracker.set_fraction(1.0),
            MotionState::Closed => self.tracker.set_fraction(0.0),
            _ => {}
        }
        if !motion.is_moving() {
            self.hook = None;
        }
    }

    /// Apply an encoder reading. Returns `true` when a pending position
    /// target was reached and the drive should be stopped.
    pub fn update_position(&mut self, position: u16) -> bool {
        let fraction = self.tracker.update(position);
        trace!("Position {} -> {:.3}", position, fraction);

        let Some(hook) = self.hook else {
            return false;
        };
        let reached = match self.motion {
            MotionState::Opening => hook.opening && position >= hook.target,
            MotionState::Closing => !hook.opening && position <= hook.target,
            _ => false,
        };
        if reached {
            debug!("Target position {} reached at {}", hook.target, position);
            self.hook = None;
        }
        reached
    }

    /// State as it would be published now.
    pub fn current(&self) -> CoverState {
        let mut position = self.tracker.fraction();
        let near_closed = position < self.closed_threshold;
        if near_closed {
            position = 0.0;
        }

        let state = match self.motion {
            MotionState::Opening => PublishedState::Opening,
            MotionState::Closing => PublishedState::Closing,
            _ if near_closed => PublishedState::Closed,
            _ if position >= 1.0 => PublishedState::Open,
            MotionState::PartialOpened => PublishedState::Partial,
            _ => PublishedState::Stopped,
        };
        CoverState { state, position }
    }

    /// Return the current state if it differs from the last published one.
    pub fn publish_if_changed(&mut self) -> Option<CoverState> {
        let current = self.current();
        if let Some(last) = &self.last_published {
            if last.same_as(&current) {
                return None;
            }
        }
        debug!(
            "Publishing {:?} at {}%",
            current.state,
            current.percent()
        );
        self.last_published = Some(current);
        Some(current)
    }

    /// Translate a host request into the command to send, if any.
    pub fn plan(&mut self, call: &CoverCall) -> Result<Option<ControlCommand>> {
        if call.stop {
            self.hook = None;
            return Ok(Some(ControlCommand::Stop));
        }
        if call.toggle {
            return Err(Bust4Error::UnsupportedOperation("toggle"));
        }
        let Some(position) = call.position else {
            return Ok(None);
        };
        if !(0.0..=1.0).contains(&position) {
            return Err(Bust4Error::UnsupportedOperation("position outside 0..1"));
        }

        if position >= 1.0 {
            self.hook = None;
            return Ok((self.motion != MotionState::Opening).then_some(ControlCommand::Open));
        }
        if position <= 0.0 {
            self.hook = None;
            return Ok((self.motion != MotionState::Closing).then_some(ControlCommand::Close));
        }

        let target = self
            .tracker
            .target_for(position)
            .ok_or(Bust4Error::UnsupportedOperation("position without known limits"))?;
        let current = self.tracker.current;
        if target == current {
            return Ok(None);
        }
        let opening = target > current;
        self.hook = Some(PositionHook { target, opening });
        debug!(
            "Moving to {} (target {}, now {})",
            position, target, current
        );
        Ok(Some(if opening {
            ControlCommand::Open
        } else {
            ControlCommand::Close
        }))
    }
}
