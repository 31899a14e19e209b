use log::LevelFilter;
use env_logger::{Builder, Target};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use chrono::Local;

/// Sends every log line to stderr and the run's log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// `scraper_YYYYmmdd_HHMMSS.log` inside `dir`.
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("scraper_{}.log", Local::now().format("%Y%m%d_%H%M%S")))
}

/// Installs the global logger. Returns the log file path.
pub fn init(level: LevelFilter, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = log_file_path(dir);
    let file = File::create(&path)?;

    Builder::new()
        .format(|buf, record| {
            writeln!(buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .target(Target::Pipe(Box::new(TeeWriter { file })))
        .init();

    log::info!("Logger initialized, writing to {:?}", path);
    Ok(path)
}
