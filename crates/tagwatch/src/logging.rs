#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tagwatch_platform::AppPaths;

/// Debug log sink capped at `max_size` bytes. When a write would push the
/// file past the cap, the current file moves to `<name>.1` and a fresh one
/// starts. A file deleted from under the sink is recreated on the next write.
struct RotatingLogFile {
    path: PathBuf,
    max_size: u64,
    file: Option<File>,
    written: u64,
}

impl RotatingLogFile {
    fn open(path: PathBuf, max_size: u64) -> io::Result<Self> {
        let mut sink = Self {
            path,
            max_size,
            file: None,
            written: 0,
        };
        sink.reopen()?;
        Ok(sink)
    }

    fn rotated_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("debug.log"), OsString::from);
        name.push(".1");
        self.path.with_file_name(name)
    }

    fn reopen(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = file.metadata().map_or(0, |metadata| metadata.len());
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        std::fs::rename(&self.path, self.rotated_path())?;
        self.reopen()
    }
}

impl Write for RotatingLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() || !self.path.exists() {
            self.reopen()?;
        }
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file not open"))?;
        let count = file.write(buf)?;
        self.written += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Send this workspace's `log` records to the debug log file, and to stderr
/// in debug builds. Records are dropped unless `debug_enabled`.
pub fn init_logging(paths: &AppPaths, debug_enabled: bool, max_log_size: u64) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("tagwatch")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));

    let log_path = paths.log_file();
    match RotatingLogFile::open(log_path.clone(), max_log_size) {
        Ok(sink) => loggers.push(WriteLogger::new(LevelFilter::Debug, config, sink)),
        Err(error) => eprintln!("tagwatch: debug log unavailable at {}: {error}", log_path.display()),
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }

    set_logging_enabled(debug_enabled);
    log::debug!("Logging to {}", log_path.display());
}

pub fn set_logging_enabled(enabled: bool) {
    let level = if enabled {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Off
    };
    log::set_max_level(level);
}
