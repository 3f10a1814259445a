//! Device controller: owns the serial link and the pin registry

use super::mode::PinMode;
use super::pin::{Pin, PinRegistry};
use crate::board::{BoardDescriptor, PinRef};
use crate::config::{ConnectionSettings, Settings, DEFAULT_BAUDRATE};
use crate::error::{Error, Result};
use crate::protocol::{Command, Frame, Reply};
use crate::serial::{Connector, PortConfig, SerialConnector, SerialProxy, Transport, DEFAULT_TIMEOUT};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Unopened,
    Connecting,
    Ready,
    /// Opening failed; this instance cannot be used again
    Failed,
    Closed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Unopened => write!(f, "unopened"),
            ControllerState::Connecting => write!(f, "connecting"),
            ControllerState::Ready => write!(f, "ready"),
            ControllerState::Failed => write!(f, "failed"),
            ControllerState::Closed => write!(f, "closed"),
        }
    }
}

/// Connection parameters of a controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Physical tty of the board
    pub tty: String,
    /// Explicit baud rate; `None` defers to the board file
    pub baudrate: Option<u32>,
    /// Used when neither `baudrate` nor the board file sets one
    pub default_baudrate: u32,
    /// Upper bound for reading one response line
    pub timeout: Duration,
    /// Read a response line after every frame
    pub await_response: bool,
    pub use_proxy: bool,
    /// Virtual tty of the proxy; defaults to `/tmp/<tty basename>.tty`
    pub proxy_tty: Option<PathBuf>,
    pub hang_up_on_close: bool,
    /// Send every pin's configured mode right after opening
    pub apply_initial_modes: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tty: String::from("/dev/ttyUSB0"),
            baudrate: None,
            default_baudrate: DEFAULT_BAUDRATE,
            timeout: DEFAULT_TIMEOUT,
            await_response: true,
            use_proxy: false,
            proxy_tty: None,
            hang_up_on_close: false,
            apply_initial_modes: false,
        }
    }
}

impl ControllerConfig {
    pub fn new(tty: &str) -> Self {
        Self {
            tty: tty.to_string(),
            ..Default::default()
        }
    }

    /// Build from resolved user settings
    pub fn from_connection(connection: &ConnectionSettings, settings: &Settings) -> Self {
        Self {
            tty: connection.tty.clone(),
            baudrate: connection.baudrate,
            default_baudrate: settings.default_baudrate,
            use_proxy: connection.use_proxy,
            hang_up_on_close: connection.hang_up_on_close,
            ..Default::default()
        }
    }

    pub fn with_baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = Some(baudrate);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_await_response(mut self, await_response: bool) -> Self {
        self.await_response = await_response;
        self
    }

    pub fn with_proxy(mut self, use_proxy: bool) -> Self {
        self.use_proxy = use_proxy;
        self
    }

    pub fn with_proxy_tty(mut self, proxy_tty: impl Into<PathBuf>) -> Self {
        self.proxy_tty = Some(proxy_tty.into());
        self
    }

    pub fn with_hang_up_on_close(mut self, enabled: bool) -> Self {
        self.hang_up_on_close = enabled;
        self
    }

    pub fn with_initial_modes(mut self, enabled: bool) -> Self {
        self.apply_initial_modes = enabled;
        self
    }
}

/// Talks to one board over one serial handle.
///
/// The handle is opened with [`open`](Self::open) and released with
/// [`close`](Self::close); there is no implicit reconnect.
pub struct DeviceController {
    descriptor: BoardDescriptor,
    config: ControllerConfig,
    baudrate: u32,
    connector: Box<dyn Connector>,
    proxy: Option<SerialProxy>,
    transport: Option<Box<dyn Transport>>,
    pins: PinRegistry,
    state: ControllerState,
}

impl DeviceController {
    pub fn new(descriptor: BoardDescriptor, config: ControllerConfig) -> Self {
        let baudrate = config
            .baudrate
            .unwrap_or_else(|| descriptor.baudrate_or(config.default_baudrate));

        let proxy = if config.use_proxy {
            let proxy = SerialProxy::new(&config.tty, baudrate);
            Some(match &config.proxy_tty {
                Some(path) => proxy.with_proxy_tty(path),
                None => proxy,
            })
        } else {
            None
        };

        Self {
            descriptor,
            config,
            baudrate,
            connector: Box::new(SerialConnector),
            proxy,
            transport: None,
            pins: PinRegistry::default(),
            state: ControllerState::Unopened,
        }
    }

    /// Replace how the serial handle is opened
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Box::new(connector);
        self
    }

    /// Attach through `proxy` instead of the physical tty
    pub fn with_proxy(mut self, proxy: SerialProxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn descriptor(&self) -> &BoardDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ControllerState::Ready
    }

    pub fn proxy(&self) -> Option<&SerialProxy> {
        self.proxy.as_ref()
    }

    pub fn pins(&self) -> &PinRegistry {
        &self.pins
    }

    /// Path the serial handle is (or will be) opened on
    pub fn port_path(&self) -> String {
        match &self.proxy {
            Some(proxy) => proxy.proxy_tty().to_string_lossy().into_owned(),
            None => self.config.tty.clone(),
        }
    }

    /// Open the serial handle, starting the proxy first if one is configured
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Ready => return Ok(()),
            ControllerState::Failed => {
                return Err(Error::connection(
                    "Controller failed to connect earlier; create a new one",
                ))
            }
            _ => {}
        }
        self.state = ControllerState::Connecting;

        if let Some(proxy) = self.proxy.as_mut() {
            if let Err(e) = proxy.start() {
                self.state = ControllerState::Failed;
                return Err(e);
            }
        }

        let port_path = self.port_path();
        let mut port = PortConfig::new(&port_path)
            .with_baud_rate(self.baudrate)
            .with_timeout(self.config.timeout);
        if self.proxy.is_none() {
            port = port.with_hang_up_on_close(self.config.hang_up_on_close);
        }

        let transport = match self.connector.connect(&port) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = ControllerState::Failed;
                log::error!("Could not connect to {}: {}", port_path, e);
                return Err(match e {
                    Error::DeviceConnection(_) => e,
                    other => Error::connection(other.to_string()),
                });
            }
        };

        self.transport = Some(transport);
        self.pins = PinRegistry::from_descriptor(&self.descriptor);
        self.state = ControllerState::Ready;
        log::info!("Connected to {} at {} baud", port_path, self.baudrate);

        if self.config.apply_initial_modes {
            if let Err(e) = self.apply_initial_modes() {
                self.transport = None;
                self.pins.clear();
                self.state = ControllerState::Failed;
                log::error!("Could not apply initial pin modes on {}: {}", port_path, e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn apply_initial_modes(&mut self) -> Result<()> {
        let modes: Vec<(u8, PinMode)> = self
            .pins
            .iter()
            .map(|state| (state.physical_id, state.mode))
            .collect();

        for (physical_id, mode) in modes {
            self.send(&mode.frame(physical_id)?)?;
        }
        Ok(())
    }

    /// Write a frame and, when awaiting responses, read one line back.
    ///
    /// A boot banner read first is swallowed: the frame is sent again and
    /// the second line is returned.
    pub fn send(&mut self, frame: &Frame) -> Result<Reply> {
        let await_response = self.config.await_response;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::connection("Not connected; open the controller first"))?;

        let message = frame.encode();
        log::debug!("Sending: {}", message);
        transport.write_all(message.as_bytes())?;

        if !await_response {
            return Ok(Reply::Sent);
        }

        let mut reply = Reply::Line(transport.read_line()?);
        if reply.is_banner() {
            log::debug!("Received boot banner, resending {}", message);
            transport.write_all(message.as_bytes())?;
            reply = Reply::Line(transport.read_line()?);
        }

        log::debug!("Received: {}", reply.line().unwrap_or_default());
        Ok(reply)
    }

    fn query(&mut self, command: Command) -> Result<Option<String>> {
        let reply = self.send(&Frame::device_query(command))?;
        Ok(reply.payload().map(str::to_string))
    }

    /// Firmware version reported by the board
    pub fn firmware_version(&mut self) -> Result<Option<String>> {
        self.query(Command::FirmwareVersion)
    }

    /// Free memory reported by the board, in bytes
    pub fn free_memory(&mut self) -> Result<Option<String>> {
        self.query(Command::FreeMemory)
    }

    /// Look up a pin by id, numeric string or alias
    pub fn get_pin(&mut self, pin: impl Into<PinRef>) -> Result<Pin<'_>> {
        let physical_id = self.descriptor.normalize_pin_id(pin)?;
        self.pin_by_id(physical_id)
    }

    /// Look up the pin wired to LED `label` (`"1"` for `led1`)
    pub fn get_led(&mut self, label: &str) -> Result<Pin<'_>> {
        let physical_id = self.descriptor.led_to_pin(label)?;
        self.pin_by_id(physical_id)
    }

    fn pin_by_id(&mut self, physical_id: u8) -> Result<Pin<'_>> {
        let pin_type = self
            .pins
            .get(physical_id)
            .map(|state| state.pin_type)
            .ok_or_else(|| {
                Error::connection(format!(
                    "Pin {} is not available; open the controller first",
                    physical_id
                ))
            })?;
        Ok(Pin::new(self, physical_id, pin_type))
    }

    pub fn tracked_mode(&self, physical_id: u8) -> Option<PinMode> {
        self.pins.get(physical_id).map(|state| state.mode)
    }

    pub(crate) fn record_mode(&mut self, physical_id: u8, mode: PinMode) {
        self.pins.set_mode(physical_id, mode);
    }

    /// Release the serial handle. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            log::debug!("Closed {}", self.port_path());
        }
        self.pins.clear();
        if self.state != ControllerState::Failed {
            self.state = ControllerState::Closed;
        }
    }
}

impl fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceController")
            .field("tty", &self.config.tty)
            .field("baudrate", &self.baudrate)
            .field("state", &self.state)
            .field("proxy", &self.proxy)
            .finish()
    }
}
