//! Optional debug log file, toggled at runtime

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing_subscriber::fmt::MakeWriter;

const LOG_DIR_NAME: &str = "UsageBar";
const LOG_FILENAME: &str = "usagebar-debug.log";

static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

// None when neither the data dir nor the temp dir is writable; writes are
// then dropped
static DEBUG_LOG_FILE: Lazy<Arc<Mutex<Option<std::fs::File>>>> = Lazy::new(|| {
    let file = open_debug_log_file().or_else(|_| open_fallback_log_file());
    if let Err(err) = &file {
        eprintln!("usagebar: debug log unavailable: {err}");
    }
    Arc::new(Mutex::new(file.ok()))
});

pub fn set_file_logging(enabled: bool) {
    FILE_LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn file_logging_enabled() -> bool {
    FILE_LOGGING_ENABLED.load(Ordering::Relaxed)
}

pub fn debug_log_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(LOG_DIR_NAME).join(LOG_FILENAME))
}

pub fn file_writer() -> DebugFileWriter {
    DebugFileWriter {
        file: DEBUG_LOG_FILE.clone(),
    }
}

fn open_debug_log_file() -> io::Result<std::fs::File> {
    let log_path = debug_log_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Missing data directory"))?;
    if let Some(log_dir) = log_path.parent() {
        std::fs::create_dir_all(log_dir)?;
    }
    OpenOptions::new().create(true).append(true).open(log_path)
}

fn open_fallback_log_file() -> io::Result<std::fs::File> {
    let path = std::env::temp_dir().join(LOG_FILENAME);
    OpenOptions::new().create(true).append(true).open(path)
}

#[derive(Clone)]
pub struct DebugFileWriter {
    file: Arc<Mutex<Option<std::fs::File>>>,
}

impl<'a> MakeWriter<'a> for DebugFileWriter {
    type Writer = DebugFileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        DebugFileWriterGuard {
            file: self.file.clone(),
        }
    }
}

pub struct DebugFileWriterGuard {
    file: Arc<Mutex<Option<std::fs::File>>>,
}

impl Write for DebugFileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !file_logging_enabled() {
            return Ok(buf.len());
        }

        match self.file.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if !file_logging_enabled() {
            return Ok(());
        }

        match self.file.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.flush(),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}
