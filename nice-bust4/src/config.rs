//! Engine configuration.

use std::time::Duration;

use crate::codes::MotorType;
use crate::frame::BusAddress;

/// Default fraction below which the cover counts as closed
pub const CLOSED_POSITION_THRESHOLD: f32 = 0.007;

/// Parameters injected into the protocol engine at construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Address this node transmits from
    pub own_address: BusAddress,
    /// Destination of control commands until the drive is discovered
    pub destination: BusAddress,
    /// Receiver address, when known in advance
    pub oxi_address: Option<BusAddress>,
    /// Actuator type, when known in advance
    pub motor_type: Option<MotorType>,
    /// Position poll interval while moving
    pub update_interval: Duration,
    /// Bus quiet time after which an unanswered command is dropped
    pub response_timeout: Duration,
    /// Upper bound on waiting for a reply, however busy the bus is
    pub max_response_wait: Duration,
    /// Gap after which a partial frame is discarded
    pub rx_timeout: Duration,
    /// Interval of discovery / identity re-requests
    pub reinit_interval: Duration,
    pub closed_threshold: f32,
    pub max_queue_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            own_address: BusAddress::CONTROLLER,
            destination: BusAddress::BROADCAST,
            oxi_address: None,
            motor_type: None,
            update_interval: Duration::from_millis(500),
            response_timeout: Duration::from_millis(100),
            max_response_wait: Duration::from_millis(500),
            rx_timeout: Duration::from_millis(50),
            reinit_interval: Duration::from_secs(10),
            closed_threshold: CLOSED_POSITION_THRESHOLD,
            max_queue_len: 32,
        }
    }
}

impl EngineConfig {
    pub fn with_own_address(mut self, address: BusAddress) -> Self {
        self.own_address = address;
        self
    }

    pub fn with_destination(mut self, address: BusAddress) -> Self {
        self.destination = address;
        self
    }

    pub fn with_oxi_address(mut self, address: BusAddress) -> Self {
        self.oxi_address = Some(address);
        self
    }

    pub fn with_motor_type(mut self, motor_type: MotorType) -> Self {
        self.motor_type = Some(motor_type);
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_max_response_wait(mut self, wait: Duration) -> Self {
        self.max_response_wait = wait;
        self
    }

    pub fn with_rx_timeout(mut self, timeout: Duration) -> Self {
        self.rx_timeout = timeout;
        self
    }

    pub fn with_reinit_interval(mut self, interval: Duration) -> Self {
        self.reinit_interval = interval;
        self
    }

    pub fn with_closed_threshold(mut self, threshold: f32) -> Self {
        self.closed_threshold = threshold;
        self
    }

    pub fn with_max_queue_len(mut self, len: usize) -> Self {
        self.max_queue_len = len.max(1);
        self
    }
}
