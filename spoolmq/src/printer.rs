//! Serial connection to the receipt printer.
//!
//! The printer owns at most one open handle. Opening and writing are the
//! caller's decisions, the printer never reconnects on its own; a handle
//! dropped by [`Printer::close`] or by a failed write is gone and the next
//! write needs a fresh open.

use crate::config::PrinterConfig;
use log::{info, warn};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

/// The escape sequence the printer understands as bold on.
const BOLD_ON: &[u8] = b"\x1B\x45\x01";

/// Newlines after the message so the text clears the tear-off edge.
const TRAILER: &[u8] = b"\n\n\n";

#[derive(Debug)]
pub(crate) enum PrinterError {
    /// No configured or matching serial device.
    NotFound(String),
    PermissionDenied(String),
    /// The device exists but the port could not be opened.
    Connect(String),
    /// A write or flush on the open port failed.
    Io(io::Error),
}

impl fmt::Display for PrinterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterError::NotFound(s) => write!(f, "printer not found: {}", s),
            PrinterError::PermissionDenied(s) => write!(f, "printer access denied: {}", s),
            PrinterError::Connect(s) => write!(f, "printer connection failed: {}", s),
            PrinterError::Io(e) => write!(f, "printer write failed: {}", e),
        }
    }
}

impl std::error::Error for PrinterError {}

pub(crate) struct Printer {
    config: PrinterConfig,
    port: Option<Box<dyn Write + Send>>,
}

impl Printer {
    pub(crate) fn new(config: PrinterConfig) -> Printer {
        Printer { config, port: None }
    }

    #[cfg(test)]
    pub(crate) fn with_port(config: PrinterConfig, port: Box<dyn Write + Send>) -> Printer {
        Printer {
            config,
            port: Some(port),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Open the serial channel to the printer. The caller holds at most
    /// one handle, re-opening while open is guarded here.
    pub(crate) fn open(&mut self) -> Result<(), PrinterError> {
        if self.port.is_some() {
            return Ok(());
        }

        let path = self.resolve_path()?;

        let port = serialport::new(&path, self.config.baud)
            .timeout(Duration::from_millis(500))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(open_error)?;

        info!("Printer connected on {} at {} baud", path, self.config.baud);

        self.port = Some(Box::new(port));

        Ok(())
    }

    /// Pick the serial device, either the explicitly configured path or
    /// the first connected device whose product name contains the
    /// configured substring.
    fn resolve_path(&self) -> Result<String, PrinterError> {
        if let Some(path) = &self.config.port {
            return Ok(path.clone());
        }

        let needle = match &self.config.name_contains {
            Some(needle) => needle,
            None => return Err(PrinterError::NotFound("no printer configured".to_string())),
        };

        let ports = serialport::available_ports().map_err(|e| PrinterError::Connect(e.to_string()))?;

        for port in ports {
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                if usb.product.as_deref().is_some_and(|product| product.contains(needle)) {
                    return Ok(port.port_name);
                }
            }
        }

        Err(PrinterError::NotFound(format!(
            "no serial device matching {:?}",
            needle
        )))
    }

    /// Write one message as a receipt and flush it out. Opens the port
    /// first if there is no live handle. A failed write drops the handle,
    /// the next print starts from a fresh open.
    pub(crate) fn print(&mut self, text: &str) -> Result<(), PrinterError> {
        if self.port.is_none() {
            self.open()?;
        }

        let port = match self.port.as_mut() {
            Some(port) => port,
            None => return Err(PrinterError::Connect("printer port is not open".to_string())),
        };

        if let Err(e) = write_receipt(port, text) {
            warn!("Dropping printer handle after failed write");

            self.port = None;

            return Err(PrinterError::Io(e));
        }

        Ok(())
    }

    /// Release the handle, best effort. Errors of the final flush are
    /// swallowed, the device may already be gone.
    pub(crate) fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            let _ = port.flush();

            info!("Printer connection closed");
        }
    }
}

/// The fixed wire format of one printed message: bold on, the raw UTF-8
/// bytes, three newlines, one flush. The text is not escaped, control
/// bytes inside it reach the printer as they are.
fn write_receipt<W: Write>(port: &mut W, text: &str) -> io::Result<()> {
    port.write_all(BOLD_ON)?;
    port.write_all(text.as_bytes())?;
    port.write_all(TRAILER)?;
    port.flush()
}

fn open_error(e: serialport::Error) -> PrinterError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => PrinterError::NotFound(e.to_string()),
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => PrinterError::PermissionDenied(e.to_string()),
        _ => PrinterError::Connect(e.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// In-memory sink recording written bytes and flush calls.
    #[derive(Clone, Default)]
    pub(crate) struct FakeSink {
        pub(crate) data: Arc<Mutex<Vec<u8>>>,
        pub(crate) flushes: Arc<Mutex<usize>>,
        pub(crate) fail_writes: bool,
    }

    impl Write for FakeSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "paper jam"));
            }

            self.data.lock().unwrap().extend_from_slice(buf);

            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            *self.flushes.lock().unwrap() += 1;

            Ok(())
        }
    }
}
