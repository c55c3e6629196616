//! UART transport for the BusT4 line
//!
//! The ESP32 UART cannot hold TX low on demand, so the break is produced by
//! dropping to the break baud rate and shifting out a single zero byte. The
//! drive's transceiver is half duplex: bytes we send come back on RX and are
//! filtered by the engine as echoes.

use esp_idf_svc::hal::delay::{BLOCK, NON_BLOCK};
use esp_idf_svc::hal::uart::UartDriver;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::EspError;
use log::{debug, trace};
use nice_bust4::{BusTransport, Bust4Error, SerialConfig};

pub struct UartBus<'d> {
    uart: UartDriver<'d>,
    serial: SerialConfig,
}

impl<'d> UartBus<'d> {
    pub fn new(uart: UartDriver<'d>, serial: SerialConfig) -> Self {
        Self { uart, serial }
    }

    /// Drain whatever the UART has buffered without blocking.
    pub fn read_available(&self, buf: &mut [u8]) -> nice_bust4::Result<usize> {
        let n = self.uart.read(buf, NON_BLOCK).map_err(transport_error)?;
        if n > 0 {
            trace!("UART_RX {} bytes: {:02X?}", n, &buf[..n.min(32)]);
        }
        Ok(n)
    }

    fn set_baud(&self, baud: u32) -> nice_bust4::Result<()> {
        self.uart
            .change_baudrate(Hertz(baud))
            .map_err(transport_error)?;
        Ok(())
    }
}

impl BusTransport for UartBus<'_> {
    fn send_break(&mut self) -> nice_bust4::Result<()> {
        self.uart.wait_tx_done(BLOCK).map_err(transport_error)?;
        self.set_baud(self.serial.break_baud)?;
        self.uart.write(&[0x00]).map_err(transport_error)?;
        self.uart.wait_tx_done(BLOCK).map_err(transport_error)?;
        self.set_baud(self.serial.work_baud)?;
        trace!("UART break sent");
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> nice_bust4::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            written += self
                .uart
                .write(&bytes[written..])
                .map_err(transport_error)?;
        }
        self.uart.wait_tx_done(BLOCK).map_err(transport_error)?;
        debug!(
            "UART_TX {} bytes in ~{:?}",
            bytes.len(),
            self.serial.byte_time() * bytes.len() as u32
        );
        Ok(())
    }
}

fn transport_error(err: EspError) -> Bust4Error {
    Bust4Error::Transport(format!("{:?}", err))
}
