//! Throughput and memory monitoring.
//!
//! `Monitor` reports a running-average rate: frames counted since the last
//! start or reset divided by the time elapsed since then. A single slow batch
//! moves the figure a little instead of making it spike.
//!
//! Memory is sampled separately through a `MemoryProbe`, so querying it never
//! touches the frame counter. An optional `MetricsLog` appends a CSV row every
//! N updates; write failures are logged and otherwise ignored.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::error::{IntakeError, Result};

// ----------------------------------------------------------------------------
// Memory probe
// ----------------------------------------------------------------------------

/// Process-memory collaborator. Read-only.
pub trait MemoryProbe: Send {
    /// Resident set size of the current process in MiB.
    fn resident_set_mb(&self) -> f64;
}

/// Reads the resident set size of this process from `/proc/self/statm`.
///
/// Reports 0.0 on platforms without procfs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    #[cfg(target_os = "linux")]
    fn resident_set_mb(&self) -> f64 {
        let statm = match std::fs::read_to_string("/proc/self/statm") {
            Ok(statm) => statm,
            Err(err) => {
                log::debug!("ProcessMemory: cannot read /proc/self/statm: {}", err);
                return 0.0;
            }
        };
        // Fields: size resident shared text lib data dt (in pages).
        let Some(resident_pages) = statm
            .split_whitespace()
            .nth(1)
            .and_then(|field| field.parse::<u64>().ok())
        else {
            return 0.0;
        };
        // SAFETY: sysconf has no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = if page_size > 0 { page_size as u64 } else { 4096 };
        (resident_pages * page_size) as f64 / (1024.0 * 1024.0)
    }

    #[cfg(not(target_os = "linux"))]
    fn resident_set_mb(&self) -> f64 {
        0.0
    }
}

// ----------------------------------------------------------------------------
// Metrics log
// ----------------------------------------------------------------------------

const LOG_HEADER: &str = "timestamp,frame_count,fps,mem_mb";

/// One metrics log row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub frame_count: u64,
    pub fps: f64,
    pub mem_mb: f64,
}

impl Snapshot {
    fn to_row(self) -> String {
        format!(
            "{},{},{:.3},{:.2}\n",
            self.timestamp, self.frame_count, self.fps, self.mem_mb
        )
    }
}

/// Append-only CSV sink written every `every` updates.
///
/// The file is opened in append mode and never truncated. Failures are
/// logged as `IntakeError::LogWrite` warnings and counted; they never reach
/// the caller.
pub struct MetricsLog {
    path: PathBuf,
    every: u64,
    file: Option<File>,
    failures: u64,
}

impl MetricsLog {
    pub fn new(path: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            path: path.into(),
            every: every.max(1),
            file: None,
            failures: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn every(&self) -> u64 {
        self.every
    }

    /// Write failures swallowed so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Best-effort append of one row.
    pub fn record(&mut self, snapshot: Snapshot) {
        if let Err(err) = self.try_record(snapshot) {
            self.failures += 1;
            // Reopen on the next attempt.
            self.file = None;
            log::warn!("{}", err);
        }
    }

    fn try_record(&mut self, snapshot: Snapshot) -> Result<()> {
        let path = self.path.clone();
        let to_err = |source| IntakeError::LogWrite {
            path: path.clone(),
            source,
        };
        if self.file.is_none() {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(to_err)?;
            if file.metadata().map_err(to_err)?.len() == 0 {
                writeln!(file, "{}", LOG_HEADER).map_err(to_err)?;
            }
            self.file = Some(file);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(snapshot.to_row().as_bytes()).map_err(to_err)?;
            file.flush().map_err(to_err)?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Monitor
// ----------------------------------------------------------------------------

/// Counter state of a running monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorState {
    pub started_at: Instant,
    pub frame_count: u64,
}

/// Running-average throughput monitor.
///
/// Idle until [`start`](Self::start) or the first update; running afterwards
/// for the rest of its life.
pub struct Monitor {
    state: Option<MonitorState>,
    updates: u64,
    probe: Box<dyn MemoryProbe>,
    log: Option<MetricsLog>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::with_probe(Box::new(ProcessMemory))
    }

    pub fn with_probe(probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            state: None,
            updates: 0,
            probe,
            log: None,
        }
    }

    /// Attach a periodic metrics log.
    pub fn with_log(mut self, log: MetricsLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<MonitorState> {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.state.map_or(0, |s| s.frame_count)
    }

    pub fn metrics_log(&self) -> Option<&MetricsLog> {
        self.log.as_ref()
    }

    /// Start the clock. No effect when already running.
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        if self.state.is_none() {
            self.state = Some(MonitorState {
                started_at: now,
                frame_count: 0,
            });
        }
    }

    /// Count `count` more frames and return the running-average rate.
    pub fn update(&mut self, count: u64) -> f64 {
        self.update_at(count, Instant::now())
    }

    /// Like [`update`](Self::update) with an explicit clock reading.
    ///
    /// An idle monitor starts at `now`, so its first reported rate is 0.0.
    pub fn update_at(&mut self, count: u64, now: Instant) -> f64 {
        self.start_at(now);
        let fps = match self.state.as_mut() {
            Some(state) => {
                state.frame_count = state.frame_count.saturating_add(count);
                let elapsed = now.saturating_duration_since(state.started_at);
                rate(state.frame_count, elapsed.as_secs_f64())
            }
            None => 0.0,
        };
        self.updates += 1;

        let due = self.log.as_ref().is_some_and(|l| self.updates % l.every() == 0);
        if due {
            let snapshot = Snapshot {
                timestamp: unix_now(),
                frame_count: self.frame_count(),
                fps,
                mem_mb: self.sample_memory_mb(),
            };
            if let Some(log) = self.log.as_mut() {
                log.record(snapshot);
            }
        }
        fps
    }

    /// Current running-average rate without counting anything.
    pub fn fps(&self) -> f64 {
        self.fps_at(Instant::now())
    }

    pub fn fps_at(&self, now: Instant) -> f64 {
        match self.state {
            Some(state) => rate(
                state.frame_count,
                now.saturating_duration_since(state.started_at).as_secs_f64(),
            ),
            None => 0.0,
        }
    }

    /// Resident memory of this process in MiB.
    pub fn sample_memory_mb(&self) -> f64 {
        self.probe.resident_set_mb()
    }

    /// Zero the counter and rebase the clock.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        self.state = Some(MonitorState {
            started_at: now,
            frame_count: 0,
        });
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

fn rate(frames: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        frames as f64 / elapsed_secs
    } else {
        0.0
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ----------------------------------------------------------------------------
// SharedMonitor
// ----------------------------------------------------------------------------

/// Monitor shared by several producer threads. Updates are serialized.
#[derive(Clone)]
pub struct SharedMonitor {
    inner: Arc<Mutex<Monitor>>,
}

impl SharedMonitor {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(monitor)),
        }
    }

    pub fn update(&self, count: u64) -> f64 {
        self.with(|m| m.update(count))
    }

    pub fn frame_count(&self) -> u64 {
        self.with(|m| m.frame_count())
    }

    pub fn fps(&self) -> f64 {
        self.with(|m| m.fps())
    }

    pub fn reset(&self) {
        self.with(|m| m.reset())
    }

    fn with<T>(&self, f: impl FnOnce(&mut Monitor) -> T) -> T {
        // A panicking producer leaves the counter consistent; keep going.
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
