//! Scripted serial and process doubles for unit tests

use crate::board::descriptor::tests::nano;
use crate::device::{ControllerConfig, DeviceController};
use crate::error::{Error, Result};
use crate::serial::{Connector, PortConfig, ProxyBackend, Transport};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Traffic seen by a [`MockTransport`]
#[derive(Debug)]
pub struct Wire {
    /// Frames written, one entry per write
    pub written: Vec<String>,
    pub reads: usize,
    /// Lines handed out in order; `fallback` once exhausted
    pub responses: VecDeque<String>,
    pub fallback: String,
    pub fail_reads: bool,
    pub fail_connect: bool,
    /// Port paths passed to the connector
    pub opened: Vec<String>,
}

impl Default for Wire {
    fn default() -> Self {
        Self {
            written: Vec::new(),
            reads: 0,
            responses: VecDeque::new(),
            fallback: "0%0%0".to_string(),
            fail_reads: false,
            fail_connect: false,
            opened: Vec::new(),
        }
    }
}

pub type SharedWire = Rc<RefCell<Wire>>;

pub struct MockTransport {
    wire: SharedWire,
}

impl Transport for MockTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.wire
            .borrow_mut()
            .written
            .push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut wire = self.wire.borrow_mut();
        wire.reads += 1;
        if wire.fail_reads {
            return Err(Error::connection("Timed out waiting for a response"));
        }
        let fallback = wire.fallback.clone();
        Ok(wire.responses.pop_front().unwrap_or(fallback))
    }
}

pub struct MockConnector {
    wire: SharedWire,
}

impl MockConnector {
    pub fn new() -> (Self, SharedWire) {
        let wire = Rc::new(RefCell::new(Wire::default()));
        (Self { wire: wire.clone() }, wire)
    }
}

impl Connector for MockConnector {
    fn connect(&mut self, config: &PortConfig) -> Result<Box<dyn Transport>> {
        let mut wire = self.wire.borrow_mut();
        wire.opened.push(config.port_path.clone());
        if wire.fail_connect {
            return Err(Error::connection(format!(
                "Could not open serial connection on {}",
                config.port_path
            )));
        }
        Ok(Box::new(MockTransport {
            wire: self.wire.clone(),
        }))
    }
}

/// Controller for the nano test board, opened on a mock transport
pub fn ready_nano() -> (DeviceController, SharedWire) {
    let (connector, wire) = MockConnector::new();
    let mut controller = DeviceController::new(nano(), ControllerConfig::new("/dev/ttyUSB0"))
        .with_connector(connector);
    controller.open().unwrap();
    (controller, wire)
}

/// Calls made on a [`RecordingBackend`]
#[derive(Debug, Default)]
pub struct ProxyRecord {
    pub held: Vec<PathBuf>,
    pub spawned: Vec<Vec<String>>,
    pub terminated: Vec<u32>,
    /// Pid reported by `find_bridge`
    pub running: Option<u32>,
    pub fail_spawn: bool,
    pub fail_terminate: bool,
}

pub type ProxyLog = Rc<RefCell<ProxyRecord>>;

pub struct RecordingBackend {
    log: ProxyLog,
}

impl RecordingBackend {
    pub fn new() -> (Self, ProxyLog) {
        let log = Rc::new(RefCell::new(ProxyRecord::default()));
        (Self { log: log.clone() }, log)
    }
}

impl ProxyBackend for RecordingBackend {
    fn hold_line(&mut self, source_tty: &Path) -> io::Result<()> {
        self.log.borrow_mut().held.push(source_tty.to_path_buf());
        Ok(())
    }

    fn spawn(&mut self, program: &str, args: &[String]) -> io::Result<u32> {
        let mut log = self.log.borrow_mut();
        if log.fail_spawn {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: not found", program),
            ));
        }
        log.spawned.push(args.to_vec());
        Ok(1000 + log.spawned.len() as u32)
    }

    fn find_bridge(&mut self, _program: &str, _proxy_tty: &Path) -> Option<u32> {
        self.log.borrow().running
    }

    fn terminate(&mut self, pid: u32) -> io::Result<()> {
        let mut log = self.log.borrow_mut();
        if log.fail_terminate {
            return Err(io::Error::from_raw_os_error(1));
        }
        log.terminated.push(pid);
        Ok(())
    }

    fn settle(&mut self, _delay: Duration) {}
}
