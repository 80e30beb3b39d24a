//! Check log: bounded in-memory history plus a retained durable file
//!
//! ## Layout
//!
//! - **history**: the most recent `capacity` lines, oldest evicted first
//! - **pending**: lines appended since the last [`LogStore::drain_new`]
//! - **file**: every line, one per row, `[YYYY-MM-DD HH:MM:SS] message`
//!
//! The file only shrinks during retention cleanup, which runs at most once
//! per `cleanup_interval` (see [`LogStore::cleanup_if_due`]) or on demand.
//! Appends and the cleanup rewrite take the same lock, so no append is lost
//! while the file is being replaced.

use std::collections::VecDeque;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use tracing::{debug, error, info};

/// In-memory history length
pub const DEFAULT_HISTORY: usize = 2000;

/// Retention of the durable file, in days
pub const DEFAULT_RETENTION_DAYS: u32 = 3;

/// Minimum time between two automatic cleanups
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d{4}-\d{2}-\d{2})[ T](\d{2}:\d{2}:\d{2})").expect("valid timestamp regex")
});

/// Outcome of one retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub kept: usize,
    pub removed: usize,

    /// Kept because no timestamp could be parsed
    pub unparsable: usize,
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "log cleanup removed {} lines, kept {} ({} without timestamp)",
            self.removed, self.kept, self.unparsable
        )
    }
}

#[derive(Debug)]
struct Buffers {
    history: VecDeque<String>,
    pending: VecDeque<String>,
    last_cleanup: Option<Instant>,
}

#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    capacity: usize,
    retention: chrono::Duration,
    cleanup_interval: Duration,
    buffers: Mutex<Buffers>,
}

impl LogStore {
    /// Open the store, creating the log file (and its directory) when missing
    pub fn open(
        path: impl Into<PathBuf>,
        capacity: usize,
        retention_days: u32,
        cleanup_interval: Duration,
    ) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;

        let capacity = capacity.max(1);

        Ok(Self {
            path,
            capacity,
            retention: chrono::Duration::days(i64::from(retention_days)),
            cleanup_interval,
            buffers: Mutex::new(Buffers {
                history: VecDeque::with_capacity(capacity),
                pending: VecDeque::new(),
                last_cleanup: None,
            }),
        })
    }

    /// Open with the default history length, retention and cleanup cadence
    pub fn with_defaults(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        Self::open(
            path,
            DEFAULT_HISTORY,
            DEFAULT_RETENTION_DAYS,
            DEFAULT_CLEANUP_INTERVAL,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timestamp a message and record it in memory and on disk
    ///
    /// A failing disk write is reported through `tracing` and otherwise ignored.
    pub fn append(&self, message: impl AsRef<str>) {
        let line = format!(
            "[{}] {}",
            Local::now().format(TIMESTAMP_FORMAT),
            message.as_ref()
        );
        info!(target: "uptime_guard::checks", "{}", message.as_ref());

        let mut buffers = self.lock();

        buffers.history.push_back(line.clone());
        while buffers.history.len() > self.capacity {
            buffers.history.pop_front();
        }
        buffers.pending.push_back(line.clone());
        while buffers.pending.len() > self.capacity {
            buffers.pending.pop_front();
        }

        if let Err(e) = self.write_line(&line) {
            error!("failed to write log file {}: {e}", self.path.display());
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    /// Lines appended since the previous call, empty if nothing new
    ///
    /// Undrained lines are capped at the history length; older ones are
    /// dropped.
    pub fn drain_new(&self) -> String {
        let mut buffers = self.lock();
        let lines: Vec<String> = buffers.pending.drain(..).collect();
        lines.join("\n")
    }

    /// The last `n` lines of the in-memory history, newline terminated
    pub fn get_recent(&self, n: usize) -> String {
        let buffers = self.lock();
        let skip = buffers.history.len().saturating_sub(n);
        let mut text = String::new();
        for line in buffers.history.iter().skip(skip) {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// Number of lines currently held in memory
    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().history.is_empty()
    }

    /// Run a retention pass if none ran within the cleanup interval
    pub fn cleanup_if_due(&self) -> Option<std::io::Result<CleanupReport>> {
        let mut buffers = self.lock();
        let due = buffers
            .last_cleanup
            .is_none_or(|last| last.elapsed() >= self.cleanup_interval);
        if !due {
            return None;
        }
        Some(self.cleanup_locked(&mut buffers))
    }

    /// Run a retention pass now
    pub fn force_cleanup(&self) -> std::io::Result<CleanupReport> {
        let mut buffers = self.lock();
        self.cleanup_locked(&mut buffers)
    }

    /// Rewrite the file without lines older than the retention window
    ///
    /// Must be called with the buffer lock held, which also blocks appends.
    fn cleanup_locked(&self, buffers: &mut Buffers) -> std::io::Result<CleanupReport> {
        buffers.last_cleanup = Some(Instant::now());

        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CleanupReport::default()),
            Err(e) => return Err(e),
        };

        let cutoff = Local::now().naive_local() - self.retention;
        let mut report = CleanupReport::default();
        let mut retained = Vec::with_capacity(content.len());

        // lines that are not valid utf-8 are kept byte for byte
        for line in content
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.trim_ascii().is_empty())
        {
            match std::str::from_utf8(line).ok().and_then(parse_timestamp) {
                Some(timestamp) if timestamp < cutoff => {
                    report.removed += 1;
                    continue;
                }
                Some(_) => {}
                None => report.unparsable += 1,
            }
            report.kept += 1;
            retained.extend_from_slice(line);
            retained.push(b'\n');
        }

        if report.removed > 0 {
            let tmp = self.path.with_extension("log.tmp");
            std::fs::write(&tmp, retained)?;
            std::fs::rename(&tmp, &self.path)?;
        }

        debug!("{report}");
        Ok(report)
    }
}

/// Extract the leading `[YYYY-MM-DD HH:MM:SS]` timestamp of a log line
pub fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    let captures = TIMESTAMP_PREFIX.captures(line)?;
    let text = format!("{} {}", &captures[1], &captures[2]);
    NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).ok()
}
