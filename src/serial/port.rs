//! Serial port configuration and connection management
//!
//! Handles port discovery and the blocking, line-oriented connection the
//! device controller sends frames over.

use super::transport::Transport;
use super::tty;
use crate::config::DEFAULT_BAUDRATE;
use crate::error::{Error, Result};
use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Default time to wait for a response line
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// USB vendor ids of boards and USB-to-serial bridges commonly found on them
const BOARD_VENDOR_IDS: &[u16] = &[
    0x2341, // Arduino
    0x2a03, // Arduino (.org)
    0x1a86, // WCH CH340/CH341
    0x0403, // FTDI
    0x10c4, // Silicon Labs CP210x
    0x067b, // Prolific PL2303
];

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, /dev/ttyACM0, /tmp/ttyUSB0.tty)
    pub port_path: String,
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Upper bound for reading one response line
    pub timeout: Duration,
    /// Force `HUPCL` on the tty before opening; `None` leaves it alone
    pub hang_up_on_close: Option<bool>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUDRATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: DEFAULT_TIMEOUT,
            hang_up_on_close: None,
        }
    }
}

impl PortConfig {
    /// Create a new 8N1 configuration for `port_path`
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_hang_up_on_close(mut self, enabled: bool) -> Self {
        self.hang_up_on_close = Some(enabled);
        self
    }
}

/// Blocking connection to a board
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        if let Some(enabled) = config.hang_up_on_close {
            if let Err(e) = tty::set_hang_up_on_close(Path::new(&config.port_path), enabled) {
                log::warn!(
                    "Could not change hang-up-on-close on {}: {}",
                    config.port_path,
                    e
                );
            }
        }

        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .map_err(|e| {
                Error::connection(format!(
                    "Could not open serial connection on {}: {}",
                    config.port_path, e
                ))
            })?;

        log::debug!(
            "Opened {} at {} baud",
            config.port_path,
            config.baud_rate
        );
        Ok(Self { port, config })
    }
}

impl Transport for SerialConnection {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .and_then(|_| self.port.flush())
            .map_err(|e| {
                Error::connection(format!(
                    "Failed to write to {}: {}",
                    self.config.port_path, e
                ))
            })
    }

    fn read_line(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.config.timeout;
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(1) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    buffer.push(byte[0]);
                }
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    return Err(Error::connection(format!(
                        "Failed to read from {}: {}",
                        self.config.port_path, e
                    )))
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::connection(format!(
                    "Timed out after {:?} waiting for a response on {}",
                    self.config.timeout, self.config.port_path
                )));
            }
        }

        Ok(String::from_utf8_lossy(&buffer).trim().to_string())
    }
}

/// USB identity of a port
#[derive(Debug, Clone, PartialEq)]
pub struct UsbIdentity {
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl UsbIdentity {
    /// Whether the vendor or product name points at a board or its USB bridge
    pub fn is_board(&self) -> bool {
        if BOARD_VENDOR_IDS.contains(&self.vid) {
            return true;
        }
        self.product.as_deref().map_or(false, |p| {
            let p = p.to_lowercase();
            p.contains("arduino") || p.contains("ch340") || p.contains("uart")
        })
    }
}

/// A serial port found on the host; `usb` is `None` for PCI, Bluetooth and unknown ports
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub usb: Option<UsbIdentity>,
}

impl PortInfo {
    pub fn is_likely_board(&self) -> bool {
        self.usb.as_ref().map_or(false, UsbIdentity::is_board)
    }
}

/// Available serial ports, likely boards first, each group sorted by path
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()?
        .into_iter()
        .map(|p| PortInfo {
            usb: match p.port_type {
                serialport::SerialPortType::UsbPort(info) => Some(UsbIdentity {
                    vid: info.vid,
                    pid: info.pid,
                    manufacturer: info.manufacturer,
                    product: info.product,
                    serial_number: info.serial_number,
                }),
                _ => None,
            },
            path: p.port_name,
        })
        .collect();
    sort_ports(&mut ports);
    Ok(ports)
}

fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by(|a, b| {
        b.is_likely_board()
            .cmp(&a.is_likely_board())
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Print the ports that look like boards, then the rest on one line each
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Connect the board over USB");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyUSB* /dev/ttyACM*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        return Ok(());
    }

    let (boards, others): (Vec<_>, Vec<_>) = ports.iter().partition(|p| p.is_likely_board());

    if boards.is_empty() {
        println!("{}", "No port looks like a board".yellow());
    } else {
        println!("{}", "Boards:".green().bold());
    }
    for port in &boards {
        println!("  {}", port.path.white().bold());
        if let Some(usb) = &port.usb {
            let name = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                .iter()
                .flatten()
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            println!("    {:04x}:{:04x} {}", usb.vid, usb.pid, name);
            if let Some(sn) = &usb.serial_number {
                println!("    serial {}", sn);
            }
        }
    }

    if !others.is_empty() {
        println!("\n{}", "Other ports:".cyan());
        for port in &others {
            let kind = match &port.usb {
                Some(usb) => format!("usb {:04x}:{:04x}", usb.vid, usb.pid),
                None => "non-usb".to_string(),
            };
            println!("  {} ({})", port.path, kind);
        }
    }

    if let Some(first) = boards.first() {
        println!(
            "\n{}",
            format!("Use: pinlink -t {} -b <BOARD> firmware", first.path).yellow()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.hang_up_on_close, None);
    }

    #[test]
    fn test_config_builder() {
        let config = PortConfig::new("/dev/ttyACM0")
            .with_baud_rate(9600)
            .with_timeout(Duration::from_secs(1))
            .with_hang_up_on_close(false);

        assert_eq!(config.port_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.hang_up_on_close, Some(false));
    }

    #[test]
    fn test_open_missing_port_is_connection_error() {
        let config = PortConfig::new("/nonexistent/ttyUSB9").with_timeout(Duration::from_millis(10));
        assert!(matches!(
            SerialConnection::open(config),
            Err(Error::DeviceConnection(_))
        ));
    }

    fn usb(path: &str, vid: u16, product: Option<&str>) -> PortInfo {
        PortInfo {
            path: path.into(),
            usb: Some(UsbIdentity {
                vid,
                pid: 0x0043,
                manufacturer: None,
                product: product.map(String::from),
                serial_number: None,
            }),
        }
    }

    #[test]
    fn test_likely_board() {
        assert!(usb("/dev/ttyACM0", 0x2341, None).is_likely_board());
        assert!(!usb("/dev/ttyACM0", 0xdead, None).is_likely_board());
        assert!(usb("/dev/ttyACM0", 0xdead, Some("Arduino Nano Every")).is_likely_board());

        let pci = PortInfo {
            path: "/dev/ttyS0".into(),
            usb: None,
        };
        assert!(!pci.is_likely_board());
    }

    #[test]
    fn test_boards_sort_first() {
        let mut ports = vec![
            PortInfo {
                path: "/dev/ttyS0".into(),
                usb: None,
            },
            usb("/dev/ttyUSB1", 0x1a86, None),
            usb("/dev/ttyACM3", 0xdead, None),
            usb("/dev/ttyACM0", 0x2341, None),
        ];
        sort_ports(&mut ports);

        let paths: Vec<&str> = ports.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(
            paths,
            ["/dev/ttyACM0", "/dev/ttyUSB1", "/dev/ttyACM3", "/dev/ttyS0"]
        );
    }
}

#[cfg(all(test, unix))]
mod pty_tests {
    use super::*;
    use std::ffi::CStr;
    use std::fs::File;
    use std::os::unix::io::FromRawFd;

    /// Open a pseudo-terminal pair: (master, slave, slave path)
    fn open_pty() -> (File, File, String) {
        let mut master: libc::c_int = 0;
        let mut slave: libc::c_int = 0;
        let mut name = [0 as libc::c_char; 128];
        let rc = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                name.as_mut_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(rc, 0, "openpty failed: {}", std::io::Error::last_os_error());

        let path = unsafe { CStr::from_ptr(name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        let master = unsafe { File::from_raw_fd(master) };
        let slave = unsafe { File::from_raw_fd(slave) };
        (master, slave, path)
    }

    #[test]
    fn test_silent_line_times_out() {
        let (_master, _slave, path) = open_pty();
        let timeout = Duration::from_millis(200);
        let mut conn = SerialConnection::open(PortConfig::new(&path).with_timeout(timeout)).unwrap();

        let started = Instant::now();
        assert!(matches!(conn.read_line(), Err(Error::DeviceConnection(_))));
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_lines_are_split_and_trimmed() {
        let (mut master, _slave, path) = open_pty();
        let config = PortConfig::new(&path).with_timeout(Duration::from_secs(1));
        let mut conn = SerialConnection::open(config).unwrap();

        master.write_all(b"Boot complete\r\n0%13%1\r\n").unwrap();
        assert_eq!(conn.read_line().unwrap(), "Boot complete");
        assert_eq!(conn.read_line().unwrap(), "0%13%1");
    }

    #[test]
    fn test_frames_reach_the_line() {
        let (mut master, _slave, path) = open_pty();
        let config = PortConfig::new(&path).with_timeout(Duration::from_secs(1));
        let mut conn = SerialConnection::open(config).unwrap();

        conn.write_all(b"<DW13001>").unwrap();
        let mut frame = [0u8; 9];
        master.read_exact(&mut frame).unwrap();
        assert_eq!(&frame, b"<DW13001>");
    }
}
