//! The host end of a serial link to the insole.
//!
//! Whatever the radio bridge writes to the port is a fragment stream with
//! the boundaries smeared out by the serial driver, which is fine: the
//! reassembler never relied on them.

use log::{debug, info, warn};
use serial2::SerialPort;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Baud rate the bridge firmware talks at.
pub const DEFAULT_BAUD: u32 = 115200;

/// Serial ports that look usable right now.
pub fn available_ports() -> io::Result<Vec<PathBuf>> {
    SerialPort::available_ports()
}

/// Open `path` for reading fragments.
pub fn open_port(path: impl AsRef<Path>, baud: u32) -> io::Result<SerialPort> {
    let path = path.as_ref();
    let mut port = SerialPort::open(path, baud)?;
    // short timeout, so the reader can notice the pipeline went away
    port.set_read_timeout(Duration::from_millis(200))?;
    info!("opened {} at {} baud", path.display(), baud);
    Ok(port)
}

/// Read `port` on its own thread and push every chunk it yields into
/// `fragments`. The thread ends when the port fails or nobody is listening
/// on `fragments` any more.
pub fn spawn_serial_reader(
    port: SerialPort,
    fragments: Sender<Vec<u8>>,
) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        let mut buffer = [0u8; 256];
        loop {
            let read_len = match port.read(&mut buffer) {
                Ok(0) => {
                    info!("serial port closed");
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("serial read failed: {}", e);
                    return Err(e);
                }
            };
            debug!("read {} bytes from the link", read_len);
            if fragments.send(buffer[..read_len].to_vec()).is_err() {
                info!("pipeline closed, serial reader stopping");
                return Ok(());
            }
        }
    })
}
