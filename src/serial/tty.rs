//! Terminal line control not covered by the `serialport` crate
//!
//! Boards with auto-reset circuitry reset whenever DTR drops. Whether the
//! kernel drops DTR when the last handle closes is governed by the termios
//! `HUPCL` flag on the tty.

use std::io;
use std::path::Path;

/// Set or clear `HUPCL` ("hang up on close") on a tty
#[cfg(unix)]
pub fn set_hang_up_on_close(path: &Path, enabled: bool) -> io::Result<()> {
    use std::fs::OpenOptions;
    use std::mem::MaybeUninit;
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)?;
    let fd = file.as_raw_fd();

    unsafe {
        let mut termios: MaybeUninit<libc::termios> = MaybeUninit::uninit();
        if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut termios = termios.assume_init();

        if enabled {
            termios.c_cflag |= libc::HUPCL;
        } else {
            termios.c_cflag &= !libc::HUPCL;
        }

        if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    log::debug!(
        "{} hang-up-on-close on {}",
        if enabled { "Enabled" } else { "Disabled" },
        path.display()
    );
    Ok(())
}

#[cfg(not(unix))]
pub fn set_hang_up_on_close(path: &Path, _enabled: bool) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("hang-up-on-close control is not available for {}", path.display()),
    ))
}
