//! Logging setup
//!
//! Console output always goes through a `fmt` layer. When a log file is
//! configured, a second layer writes plain text into a file that is rotated by
//! size, keeping `backups` older copies as `<file>.1 .. <file>.N`.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `config.level`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Logging(e.to_string()))?;

    let file_layer = match &config.file_path {
        Some(path) => {
            let writer = RotatingFile::open(path, config.max_size, config.backups)?;
            Some(fmt::layer().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

/// Size-rotated log file usable as a `tracing_subscriber` writer
#[derive(Clone)]
pub struct RotatingFile {
    inner: Arc<Mutex<RotatingState>>,
}

struct RotatingState {
    path: PathBuf,
    file: File,
    size: u64,
    max_size: u64,
    backups: u32,
}

impl RotatingFile {
    pub fn open(path: &Path, max_size: u64, backups: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingState {
                path: path.to_path_buf(),
                file,
                size,
                max_size,
                backups,
            })),
        })
    }
}

impl RotatingState {
    fn backup_path(&self, idx: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", idx));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups > 0 {
            let oldest = self.backup_path(self.backups);
            if oldest.exists() {
                std::fs::remove_file(&oldest)?;
            }
            for idx in (1..self.backups).rev() {
                let from = self.backup_path(idx);
                if from.exists() {
                    std::fs::rename(&from, self.backup_path(idx + 1))?;
                }
            }
            std::fs::rename(&self.path, self.backup_path(1))?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.inner.lock();
        if state.max_size > 0 && state.size > 0 && state.size + buf.len() as u64 > state.max_size {
            state.rotate()?;
        }
        let written = state.file.write(buf)?;
        state.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotates_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav.log");
        let mut log = RotatingFile::open(&path, 16, 2).unwrap();

        log.write_all(b"0123456789\n").unwrap();
        log.write_all(b"abcdefghij\n").unwrap();
        log.write_all(b"ABCDEFGHIJ\n").unwrap();
        log.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ABCDEFGHIJ\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nav.log.1")).unwrap(),
            "abcdefghij\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nav.log.2")).unwrap(),
            "0123456789\n"
        );
    }

    #[test]
    fn test_keeps_only_configured_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav.log");
        let mut log = RotatingFile::open(&path, 4, 1).unwrap();

        for line in ["aaaa", "bbbb", "cccc"] {
            log.write_all(line.as_bytes()).unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "cccc");
        assert_eq!(std::fs::read_to_string(dir.path().join("nav.log.1")).unwrap(), "bbbb");
        assert!(!dir.path().join("nav.log.2").exists());
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("nav.log");
        {
            let mut log = RotatingFile::open(&path, 1024, 1).unwrap();
            log.write_all(b"first\n").unwrap();
        }
        let mut log = RotatingFile::open(&path, 1024, 1).unwrap();
        log.write_all(b"second\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
