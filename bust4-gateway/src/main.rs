//! Nice BusT4 gate controller for ESP32
//!
//! Drives a Nice control unit over its BusT4 port and tracks the gate as a
//! cover: open/close/stop, partial positions, end-stops and drive settings.
//!
//! ## Features
//! - NVS-based configuration persistence
//! - Watchdog timer for automatic recovery
//! - Panic handler with automatic restart
//! - Serial console for commands and raw frames
//! - BOOT button sends step-by-step

use esp_idf_svc::{
    hal::{
        gpio::{PinDriver, Pull},
        prelude::*,
        task::watchdog::{TWDTConfig, TWDTDriver},
        uart::{config::Config as UartConfig, UartDriver},
        units::Hertz,
    },
    nvs::{EspDefaultNvsPartition, EspNvsPartition, NvsDefault},
};
use log::{debug, error, info, warn};
use nice_bust4::{ControlCommand, ProtocolEngine};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

mod config;
mod console;
mod uart;

use config::GatewayConfig;
use console::{console_task, ConsoleCommand};
use uart::UartBus;

/// Watchdog timeout in seconds
const WATCHDOG_TIMEOUT_SECS: u64 = 30;

/// Main loop period; one FreeRTOS tick at the default 100 Hz
const LOOP_PERIOD: Duration = Duration::from_millis(10);

/// How often engine counters are logged
const STATS_INTERVAL: Duration = Duration::from_secs(60);

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // Set up panic handler for automatic restart
    std::panic::set_hook(Box::new(|panic_info| {
        error!("PANIC: {}", panic_info);
        error!("Restarting in 3 seconds...");
        thread::sleep(Duration::from_secs(3));
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }));

    info!("BusT4 gate controller starting");

    let peripherals = Peripherals::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    info!("Initializing watchdog timer...");
    let twdt_config = TWDTConfig {
        duration: Duration::from_secs(WATCHDOG_TIMEOUT_SECS),
        panic_on_trigger: true,
        subscribed_idle_tasks: enumset::EnumSet::empty(),
    };
    let mut twdt_driver = TWDTDriver::new(peripherals.twdt, &twdt_config)?;
    let mut watchdog = twdt_driver.watch_current_task()?;

    let mut config = match GatewayConfig::load_from_nvs(nvs.clone()) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Failed to load config from NVS: {}, using defaults", e);
            GatewayConfig::default()
        }
    };
    info!("Configuration loaded:");
    info!("  Own address: {}", config.own_address);
    info!("  Drive address: {}", config.destination);
    info!("  Baud: {} (break {})", config.serial.work_baud, config.serial.break_baud);

    // BusT4 port: TX on GPIO17, RX on GPIO16 through the level shifter
    let uart_config = UartConfig::default()
        .baudrate(Hertz(config.serial.work_baud))
        .data_bits(esp_idf_svc::hal::uart::config::DataBits::DataBits8)
        .parity_none()
        .stop_bits(esp_idf_svc::hal::uart::config::StopBits::STOP1);
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio16,
        Option::<esp_idf_svc::hal::gpio::Gpio0>::None,
        Option::<esp_idf_svc::hal::gpio::Gpio0>::None,
        &uart_config,
    )?;
    let mut bus = UartBus::new(uart, config.serial.with_pins(17, 16));
    info!("BusT4 UART initialized at {} baud", config.serial.work_baud);

    let mut button = PinDriver::input(peripherals.pins.gpio0)?;
    button.set_pull(Pull::Up)?;
    let mut button_was_pressed = false;

    let (console_tx, console_rx) = mpsc::channel();
    let _console_thread = thread::Builder::new()
        .stack_size(6144)
        .spawn(move || console_task(console_tx))?;

    let mut engine = ProtocolEngine::new(config.engine_config());
    let start = Instant::now();
    engine.start(start);
    let mut last_stats = start;
    let mut rx_buf = [0u8; 256];

    info!("Gateway running!");

    loop {
        watchdog.feed()?;
        let now = Instant::now();

        match bus.read_available(&mut rx_buf) {
            Ok(n) if n > 0 => {
                if let Some(state) = engine.on_bytes(&rx_buf[..n], now) {
                    info!("Cover: {:?} {}%", state.state, state.percent());
                }
            }
            Ok(_) => {}
            Err(e) => warn!("UART read failed: {}", e),
        }

        // Button is active low
        let pressed = button.is_low();
        if pressed && !button_was_pressed {
            info!("Button: step by step");
            if let Err(e) = engine.enqueue_command(ControlCommand::StepByStep) {
                warn!("Failed to queue step by step: {}", e);
            }
        }
        button_was_pressed = pressed;

        while let Ok(command) = console_rx.try_recv() {
            handle_console(&mut engine, &mut config, &nvs, command);
        }

        engine.tick(&mut bus, now);

        for fault in engine.drain_faults() {
            debug!("Fault: {}", fault);
        }

        if now.duration_since(last_stats) >= STATS_INTERVAL {
            last_stats = now;
            let stats = engine.stats();
            info!(
                "Stats: rx={} tx={} malformed={} timeouts={} errors={} queue={}",
                stats.frames_received,
                stats.frames_sent,
                stats.malformed_frames,
                stats.response_timeouts,
                stats.device_errors,
                engine.queue_len()
            );
        }

        thread::sleep(LOOP_PERIOD);
    }
}

fn handle_console(
    engine: &mut ProtocolEngine,
    config: &mut GatewayConfig,
    nvs: &EspNvsPartition<NvsDefault>,
    command: ConsoleCommand,
) {
    let result = match command {
        ConsoleCommand::Cover(call) => engine.control(&call),
        ConsoleCommand::Control(code) => match ControlCommand::from_u8(code) {
            Some(cmd) => engine.enqueue_command(cmd),
            None => {
                warn!("Console: unknown control command 0x{:02X}", code);
                Ok(())
            }
        },
        ConsoleCommand::Raw(text) => engine.send_raw_command(&text),
        ConsoleCommand::Inf {
            to,
            whose,
            submenu,
            run,
            next_data,
            data,
        } => engine.send_inf_cmd(&to, &whose, &submenu, &run, &next_data, &data),
        ConsoleCommand::Mcu { submenu, data } => engine.set_mcu(&submenu, &data),
        ConsoleCommand::Setting(setting, enabled) => engine.set_setting(setting, enabled),
        ConsoleCommand::Dump => {
            engine.dump_config();
            Ok(())
        }
        ConsoleCommand::Stats => {
            info!("{:#?}", engine.stats());
            Ok(())
        }
        ConsoleCommand::Save => {
            config.destination = engine.drive_address();
            config.oxi_address = engine.oxi_address();
            config.motor_type = engine.motor_type();
            if let Err(e) = config.save_to_nvs(nvs.clone()) {
                error!("Failed to save config: {}", e);
            }
            Ok(())
        }
        ConsoleCommand::Reset => {
            if let Err(e) = GatewayConfig::clear_nvs(nvs.clone()) {
                error!("Failed to clear config: {}", e);
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Console command failed: {}", e);
    }
}
