use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

pub const LOG_FILE_MAX_BYTES: u64 = 5 * 1024 * 1024;
pub const LOG_FILE_BACKUPS: usize = 5;

/// A log file capped at `max_bytes`. When a write would exceed the cap the file is
/// renamed to `<path>.1`, older backups shift up by one, and at most `backups` are kept.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    current_bytes: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let current_bytes = file.metadata()?.len();

        Ok(RotatingFile {
            path,
            max_bytes,
            backups,
            file,
            current_bytes,
        })
    }

    fn backup_path(&self, generation: usize) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{}", generation));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups == 0 {
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .create(true)
                .open(&self.path)?;
            self.current_bytes = 0;
            return Ok(());
        }

        for generation in (1..self.backups).rev() {
            let source = self.backup_path(generation);
            if source.exists() {
                std::fs::rename(&source, self.backup_path(generation + 1))?;
            }
        }
        std::fs::rename(&self.path, self.backup_path(1))?;

        self.file = open_append(&self.path)?;
        self.current_bytes = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_bytes > 0 && self.current_bytes + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }

        let written = self.file.write(buf)?;
        self.current_bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn with_quiet_dependencies(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level)
        .with_target("aws_config", LevelFilter::WARN)
        .with_target("aws_sdk_ecs", LevelFilter::WARN)
        .with_target("aws_smithy", LevelFilter::WARN)
        .with_target("hyper", LevelFilter::WARN)
        .with_target("reqwest", LevelFilter::WARN)
        .with_target("rustls", LevelFilter::WARN)
}

/// Console at INFO, or DEBUG when `verbose`, plus every DEBUG event in the rotating `log_file`.
pub fn init(verbose: bool, log_file: &Path) -> io::Result<()> {
    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let console = fmt::layer()
        .without_time()
        .with_target(false)
        .with_filter(with_quiet_dependencies(console_level));

    let file = RotatingFile::open(log_file, LOG_FILE_MAX_BYTES, LOG_FILE_BACKUPS)?;
    let file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(with_quiet_dependencies(LevelFilter::DEBUG));

    tracing_subscriber::registry().with(console).with(file).init();

    if verbose {
        tracing::debug!("Verbose logging selected");
    }
    Ok(())
}
