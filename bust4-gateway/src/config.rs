//! Gateway configuration with NVS persistence
//!
//! Bus addresses and timing are stored in ESP32 Non-Volatile Storage so a
//! drive found once keeps its address across reboots. First boot uses the
//! library defaults.

use std::time::Duration;

use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use log::{info, warn};
use nice_bust4::{BusAddress, EngineConfig, MotorType, SerialConfig};

/// NVS namespace for gateway configuration
const NVS_NAMESPACE: &str = "bust4_cfg";

/// Stored in place of an absent receiver address
const NO_ADDRESS: u16 = 0xFFFF;

mod nvs_keys {
    pub const OWN_ADDR: &str = "own_addr";
    pub const DST_ADDR: &str = "dst_addr";
    pub const OXI_ADDR: &str = "oxi_addr";
    pub const MOTOR: &str = "motor";
    pub const UPDATE_MS: &str = "update_ms";
    pub const RESP_MS: &str = "resp_ms";
    pub const WORK_BAUD: &str = "work_baud";
    pub const CONFIGURED: &str = "configured";
}

/// Gateway configuration settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // Bus addressing
    pub own_address: BusAddress,
    pub destination: BusAddress,
    pub oxi_address: Option<BusAddress>,

    /// Skips the motor type query when set
    pub motor_type: Option<MotorType>,

    // Timing
    pub update_interval_ms: u32,
    pub response_timeout_ms: u32,

    pub serial: SerialConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            own_address: engine.own_address,
            destination: engine.destination,
            oxi_address: None,
            motor_type: None,
            update_interval_ms: engine.update_interval.as_millis() as u32,
            response_timeout_ms: engine.response_timeout.as_millis() as u32,
            serial: SerialConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from NVS, falling back to defaults if not configured
    pub fn load_from_nvs(nvs_partition: EspNvsPartition<NvsDefault>) -> Result<Self, anyhow::Error> {
        let nvs = match EspNvs::new(nvs_partition, NVS_NAMESPACE, true) {
            Ok(nvs) => nvs,
            Err(e) => {
                warn!("Failed to open NVS namespace, using defaults: {}", e);
                return Ok(Self::default());
            }
        };

        let configured: bool = nvs
            .get_u8(nvs_keys::CONFIGURED)
            .ok()
            .flatten()
            .map(|v| v != 0)
            .unwrap_or(false);

        if !configured {
            info!("No saved configuration found, using defaults");
            return Ok(Self::default());
        }

        info!("Loading configuration from NVS...");

        let mut config = Self::default();

        if let Ok(Some(addr)) = nvs.get_u16(nvs_keys::OWN_ADDR) {
            config.own_address = unpack_address(addr);
        }
        if let Ok(Some(addr)) = nvs.get_u16(nvs_keys::DST_ADDR) {
            config.destination = unpack_address(addr);
        }
        if let Ok(Some(addr)) = nvs.get_u16(nvs_keys::OXI_ADDR) {
            config.oxi_address = (addr != NO_ADDRESS).then(|| unpack_address(addr));
        }
        if let Ok(Some(motor)) = nvs.get_u8(nvs_keys::MOTOR) {
            config.motor_type = MotorType::from_u8(motor);
        }

        if let Ok(Some(ms)) = nvs.get_u32(nvs_keys::UPDATE_MS) {
            config.update_interval_ms = ms;
        }
        if let Ok(Some(ms)) = nvs.get_u32(nvs_keys::RESP_MS) {
            config.response_timeout_ms = ms;
        }
        if let Ok(Some(baud)) = nvs.get_u32(nvs_keys::WORK_BAUD) {
            config.serial.work_baud = baud;
        }

        info!("Configuration loaded from NVS");
        Ok(config)
    }

    /// Save configuration to NVS
    pub fn save_to_nvs(&self, nvs_partition: EspNvsPartition<NvsDefault>) -> Result<(), anyhow::Error> {
        let mut nvs = EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?;

        info!("Saving configuration to NVS...");

        nvs.set_u16(nvs_keys::OWN_ADDR, pack_address(self.own_address))?;
        nvs.set_u16(nvs_keys::DST_ADDR, pack_address(self.destination))?;
        nvs.set_u16(
            nvs_keys::OXI_ADDR,
            self.oxi_address.map(pack_address).unwrap_or(NO_ADDRESS),
        )?;
        nvs.set_u8(nvs_keys::MOTOR, self.motor_type.map(|m| m as u8).unwrap_or(0))?;

        nvs.set_u32(nvs_keys::UPDATE_MS, self.update_interval_ms)?;
        nvs.set_u32(nvs_keys::RESP_MS, self.response_timeout_ms)?;
        nvs.set_u32(nvs_keys::WORK_BAUD, self.serial.work_baud)?;

        nvs.set_u8(nvs_keys::CONFIGURED, 1)?;

        info!("Configuration saved to NVS");
        Ok(())
    }

    /// Clear all saved configuration (reset to defaults on next boot)
    pub fn clear_nvs(nvs_partition: EspNvsPartition<NvsDefault>) -> Result<(), anyhow::Error> {
        let nvs = EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?;
        nvs.set_u8(nvs_keys::CONFIGURED, 0)?;
        info!("Configuration cleared - will use defaults on next boot");
        Ok(())
    }

    /// Engine settings derived from the stored values
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::default()
            .with_own_address(self.own_address)
            .with_destination(self.destination)
            .with_update_interval(Duration::from_millis(u64::from(self.update_interval_ms)))
            .with_response_timeout(Duration::from_millis(u64::from(self.response_timeout_ms)));
        if let Some(oxi) = self.oxi_address {
            engine = engine.with_oxi_address(oxi);
        }
        if let Some(motor) = self.motor_type {
            engine = engine.with_motor_type(motor);
        }
        engine
    }
}

fn pack_address(address: BusAddress) -> u16 {
    u16::from_be_bytes(address.to_bytes())
}

fn unpack_address(value: u16) -> BusAddress {
    let [network, address] = value.to_be_bytes();
    BusAddress::new(network, address)
}
