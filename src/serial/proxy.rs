//! Serial proxy keeping the physical line open across invocations
//!
//! Most auto-reset boards reboot whenever the host opens or closes their
//! serial port. The proxy runs `socat` as a long-lived bridge between the
//! physical tty and a virtual pty; short-lived clients open the virtual end
//! while `socat` stays the only owner of the physical line.
//!
//! Liveness is judged by the virtual path existing. A bridge that crashed
//! can leave a stale link behind, and two processes starting the proxy at
//! the same moment can race; both are accepted limitations.

use super::tty;
use crate::error::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use sysinfo::System;

/// Framing applied to both ends of the bridge: 8N1, no flow control,
/// raw/no-echo, exclusive non-blocking lock
pub const BRIDGE_FRAMING: &str =
    "cs8,parenb=0,cstopb=0,clocal=0,raw,echo=0,setlk,flock-ex-nb,nonblock=1";

/// Bridge program
pub const SOCAT: &str = "socat";

/// Directory holding the virtual ttys, shared by every invocation
pub const PROXY_DIR: &str = "/tmp";

/// Time the bridge gets to create the virtual pty (and to release it on stop)
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Process-level operations the proxy depends on
pub trait ProxyBackend {
    /// Put the physical line into the held state before bridging
    fn hold_line(&mut self, source_tty: &Path) -> io::Result<()>;

    /// Spawn the bridge and return its pid
    fn spawn(&mut self, program: &str, args: &[String]) -> io::Result<u32>;

    /// Find a running bridge serving `proxy_tty`
    fn find_bridge(&mut self, program: &str, proxy_tty: &Path) -> Option<u32>;

    fn terminate(&mut self, pid: u32) -> io::Result<()>;

    fn settle(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Backend that runs real processes
#[derive(Debug, Default)]
pub struct SocatBackend {
    children: Vec<Child>,
}

impl ProxyBackend for SocatBackend {
    fn hold_line(&mut self, source_tty: &Path) -> io::Result<()> {
        tty::set_hang_up_on_close(source_tty, true)
    }

    fn spawn(&mut self, program: &str, args: &[String]) -> io::Result<u32> {
        let path = find_program(program).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found on PATH; install it to use the serial proxy", program),
            )
        })?;
        let child = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()?;
        let pid = child.id();
        self.children.push(child);
        Ok(pid)
    }

    fn find_bridge(&mut self, program: &str, proxy_tty: &Path) -> Option<u32> {
        let needle = proxy_tty.to_string_lossy();
        let system = System::new_all();

        system
            .processes()
            .iter()
            .find(|(_, process)| {
                let is_bridge = process.name().to_string_lossy().contains(program);
                is_bridge
                    && process
                        .cmd()
                        .iter()
                        .any(|arg| arg.to_string_lossy().contains(&*needle))
            })
            .map(|(pid, _)| pid.as_u32())
    }

    #[cfg(unix)]
    fn terminate(&mut self, pid: u32) -> io::Result<()> {
        let raw = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        if unsafe { libc::kill(raw, libc::SIGTERM) } != 0 {
            return Err(io::Error::last_os_error());
        }

        // Reap the bridge if this process spawned it
        if let Some(index) = self.children.iter().position(|c| c.id() == pid) {
            let mut child = self.children.swap_remove(index);
            child.wait()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self, pid: u32) -> io::Result<()> {
        match self.children.iter().position(|c| c.id() == pid) {
            Some(index) => {
                let mut child = self.children.swap_remove(index);
                child.kill()?;
                child.wait().map(|_| ())
            }
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot signal foreign process {}", pid),
            )),
        }
    }
}

/// A `socat` bridge from `source_tty` to `proxy_tty`
pub struct SerialProxy {
    source_tty: PathBuf,
    proxy_tty: PathBuf,
    baudrate: u32,
    debug: bool,
    program: String,
    settle_delay: Duration,
    spawned_pid: Option<u32>,
    backend: Box<dyn ProxyBackend>,
}

impl SerialProxy {
    /// Proxy for `source_tty`, exposed at `/tmp/<basename>.tty`
    pub fn new(source_tty: impl Into<PathBuf>, baudrate: u32) -> Self {
        let source_tty = source_tty.into();
        let proxy_tty = default_proxy_tty(&source_tty);
        log::debug!("Serial proxy expected at: {}", proxy_tty.display());

        Self {
            source_tty,
            proxy_tty,
            baudrate,
            debug: false,
            program: SOCAT.to_string(),
            settle_delay: SETTLE_DELAY,
            spawned_pid: None,
            backend: Box::new(SocatBackend::default()),
        }
    }

    pub fn with_proxy_tty(mut self, proxy_tty: impl Into<PathBuf>) -> Self {
        self.proxy_tty = proxy_tty.into();
        self
    }

    /// Run the bridge with hex dumps and verbose diagnostics
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_backend(mut self, backend: impl ProxyBackend + 'static) -> Self {
        self.backend = Box::new(backend);
        self
    }

    pub fn source_tty(&self) -> &Path {
        &self.source_tty
    }

    pub fn proxy_tty(&self) -> &Path {
        &self.proxy_tty
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// Pid of the bridge started by this instance, if any
    pub fn spawned_pid(&self) -> Option<u32> {
        self.spawned_pid
    }

    /// Whether a bridge appears to be running (the virtual path exists)
    pub fn is_running(&self) -> bool {
        self.proxy_tty.exists()
    }

    /// Arguments passed to the bridge program
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec!["-s".to_string()];
        if self.debug {
            args.extend(["-x", "-ddd", "-ddd"].map(String::from));
        } else {
            args.push("-d".to_string());
        }
        args.push(format!(
            "{},b{},{}",
            self.source_tty.display(),
            self.baudrate,
            BRIDGE_FRAMING
        ));
        args.push(format!(
            "PTY,link={},b{},{}",
            self.proxy_tty.display(),
            self.baudrate,
            BRIDGE_FRAMING
        ));
        args
    }

    /// Start the bridge unless the virtual path already exists.
    ///
    /// Returns `true` when a new bridge was spawned.
    pub fn start(&mut self) -> Result<bool> {
        if self.is_running() {
            log::debug!(
                "Serial proxy already running on {}",
                self.proxy_tty.display()
            );
            return Ok(false);
        }

        self.backend.hold_line(&self.source_tty).map_err(|e| {
            Error::proxy(format!(
                "Cannot set hang-up-on-close on {}: {}",
                self.source_tty.display(),
                e
            ))
        })?;

        let args = self.command_args();
        log::debug!("Starting {} {}", self.program, args.join(" "));
        let pid = self
            .backend
            .spawn(&self.program, &args)
            .map_err(|e| Error::proxy(format!("Cannot start {}: {}", self.program, e)))?;
        self.spawned_pid = Some(pid);

        log::info!(
            "Started serial proxy on {} (pid {})",
            self.proxy_tty.display(),
            pid
        );
        self.backend.settle(self.settle_delay);

        if !self.is_running() {
            log::warn!(
                "Serial proxy {} did not appear within {:?}",
                self.proxy_tty.display(),
                self.settle_delay
            );
        }
        Ok(true)
    }

    /// Terminate the bridge serving this proxy's virtual path.
    ///
    /// Fails when no such process can be found.
    pub fn stop(&mut self) -> Result<()> {
        let tracked = self.spawned_pid.take();
        let pid = match tracked {
            Some(pid) => pid,
            None => self
                .backend
                .find_bridge(&self.program, &self.proxy_tty)
                .ok_or_else(|| {
                    Error::proxy(format!(
                        "No {} process found serving {}",
                        self.program,
                        self.proxy_tty.display()
                    ))
                })?,
        };

        if let Err(e) = self.backend.terminate(pid) {
            self.spawned_pid = tracked;
            return Err(Error::proxy(format!(
                "Cannot stop serial proxy (pid {}): {}",
                pid, e
            )));
        }
        log::info!(
            "Stopped serial proxy on {} (pid {})",
            self.proxy_tty.display(),
            pid
        );
        self.backend.settle(self.settle_delay);
        Ok(())
    }
}

impl std::fmt::Debug for SerialProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialProxy")
            .field("source_tty", &self.source_tty)
            .field("proxy_tty", &self.proxy_tty)
            .field("baudrate", &self.baudrate)
            .field("spawned_pid", &self.spawned_pid)
            .finish()
    }
}

/// `/dev/ttyUSB0` -> `/tmp/ttyUSB0.tty`. A path already ending in `.tty`
/// is a virtual tty and is returned unchanged.
pub fn default_proxy_tty(source_tty: &Path) -> PathBuf {
    if source_tty.extension().map_or(false, |ext| ext == "tty") {
        return source_tty.to_path_buf();
    }
    let name = source_tty
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "serial".to_string());
    Path::new(PROXY_DIR).join(format!("{}.tty", name))
}

/// Full path of `program` if it is on `PATH`
pub fn find_program(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ProxyLog, RecordingBackend};

    fn proxy_in(dir: &Path) -> (SerialProxy, ProxyLog) {
        let (backend, log) = RecordingBackend::new();
        let proxy = SerialProxy::new("/dev/ttyUSB0", 115200)
            .with_proxy_tty(dir.join("ttyUSB0.tty"))
            .with_backend(backend);
        (proxy, log)
    }

    #[test]
    fn test_default_proxy_path() {
        assert_eq!(
            default_proxy_tty(Path::new("/dev/ttyUSB1")),
            PathBuf::from("/tmp/ttyUSB1.tty")
        );
        assert_eq!(
            default_proxy_tty(Path::new("/tmp/ttyUSB1.tty")),
            PathBuf::from("/tmp/ttyUSB1.tty")
        );
        assert_eq!(
            SerialProxy::new("/dev/ttyACM0", 115200).proxy_tty(),
            Path::new("/tmp/ttyACM0.tty")
        );
    }

    #[test]
    fn test_missing_program_is_reported() {
        assert!(find_program("pinlink-no-such-bridge").is_none());

        let mut backend = SocatBackend::default();
        let err = backend
            .spawn("pinlink-no-such-bridge", &["-d".to_string()])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("not found on PATH"));
    }

    #[test]
    fn test_failed_terminate_keeps_spawned_pid() {
        let dir = tempfile::tempdir().unwrap();
        let (mut proxy, log) = proxy_in(dir.path());

        proxy.start().unwrap();
        let pid = proxy.spawned_pid().unwrap();
        log.borrow_mut().fail_terminate = true;
        assert!(matches!(proxy.stop(), Err(Error::Proxy(_))));
        assert_eq!(proxy.spawned_pid(), Some(pid));

        log.borrow_mut().fail_terminate = false;
        proxy.stop().unwrap();
        assert_eq!(log.borrow().terminated, vec![pid]);
        assert_eq!(proxy.spawned_pid(), None);
    }

    #[test]
    fn test_command_args() {
        let proxy = SerialProxy::new("/dev/ttyUSB0", 57600).with_proxy_tty("/tmp/ttyUSB0.tty");
        let args = proxy.command_args();
        assert_eq!(args[0], "-s");
        assert_eq!(args[1], "-d");
        assert_eq!(
            args[2],
            format!("/dev/ttyUSB0,b57600,{}", BRIDGE_FRAMING)
        );
        assert_eq!(
            args[3],
            format!("PTY,link=/tmp/ttyUSB0.tty,b57600,{}", BRIDGE_FRAMING)
        );

        let debug_args = proxy.with_debug(true).command_args();
        assert_eq!(&debug_args[..4], &["-s", "-x", "-ddd", "-ddd"]);
    }

    #[test]
    fn test_start_spawns_once_then_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut proxy, log) = proxy_in(dir.path());

        assert!(proxy.start().unwrap());
        assert_eq!(log.borrow().spawned.len(), 1);
        assert_eq!(log.borrow().held, vec![PathBuf::from("/dev/ttyUSB0")]);

        // The bridge has created its link now
        std::fs::write(proxy.proxy_tty(), b"").unwrap();
        assert!(!proxy.start().unwrap());
        assert_eq!(log.borrow().spawned.len(), 1);
    }

    #[test]
    fn test_start_twice_with_existing_path_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let (mut proxy, log) = proxy_in(dir.path());
        std::fs::write(proxy.proxy_tty(), b"").unwrap();

        assert!(!proxy.start().unwrap());
        assert!(!proxy.start().unwrap());
        assert!(log.borrow().spawned.is_empty());
        assert!(log.borrow().held.is_empty());
    }

    #[test]
    fn test_spawn_failure_is_proxy_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut proxy, log) = proxy_in(dir.path());
        log.borrow_mut().fail_spawn = true;

        assert!(matches!(proxy.start(), Err(Error::Proxy(_))));
        assert_eq!(proxy.spawned_pid(), None);
    }

    #[test]
    fn test_stop_prefers_spawned_pid() {
        let dir = tempfile::tempdir().unwrap();
        let (mut proxy, log) = proxy_in(dir.path());

        proxy.start().unwrap();
        let pid = proxy.spawned_pid().unwrap();
        proxy.stop().unwrap();

        assert_eq!(log.borrow().terminated, vec![pid]);
        assert_eq!(proxy.spawned_pid(), None);
    }

    #[test]
    fn test_stop_locates_foreign_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let (mut proxy, log) = proxy_in(dir.path());
        log.borrow_mut().running = Some(4242);

        proxy.stop().unwrap();
        assert_eq!(log.borrow().terminated, vec![4242]);
    }

    #[test]
    fn test_stop_without_bridge_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let (mut proxy, log) = proxy_in(dir.path());

        assert!(matches!(proxy.stop(), Err(Error::Proxy(_))));
        assert!(log.borrow().terminated.is_empty());
    }
}
