//! Writer for the diagnostic log file layer.
//!
//! The terminal layer writes to stderr directly so that stdout only carries
//! test output. The file layer gets its own [`EnvFilter`] and appends to
//! `<dir>/testhost.log` through [`LogFile`].
//!
//! [`EnvFilter`]: tracing_subscriber::EnvFilter

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the diagnostic log.
pub const LOG_FILE_NAME: &str = "testhost.log";

/// Shared handle to the diagnostic log file.
///
/// Implements [`MakeWriter`](tracing_subscriber::fmt::MakeWriter): every
/// event is buffered and appended in one write, so lines from concurrent
/// tasks never interleave.
#[derive(Clone)]
pub struct LogFile {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl LogFile {
    /// Opens `<dir>/testhost.log` for appending, creating `dir` if needed.
    pub fn open(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFile {
    type Writer = LogEvent;

    fn make_writer(&'a self) -> Self::Writer {
        LogEvent {
            file: Arc::clone(&self.file),
            buf: Vec::with_capacity(256),
        }
    }
}

/// One formatted event, flushed to the file on drop.
pub struct LogEvent {
    file: Arc<Mutex<File>>,
    buf: Vec<u8>,
}

impl Write for LogEvent {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogEvent {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let mut file = self.file.lock();
        let _ = file.write_all(&self.buf);
        let _ = file.flush();
    }
}
