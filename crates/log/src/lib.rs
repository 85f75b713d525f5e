//! Process-wide leveled logging with per-target overrides.
//!
//! Records go to stderr as text or JSON lines and can also be captured into a
//! bounded in-memory ring, which tests use to assert on emitted events.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(Self::Off),
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Off,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Text = 0,
    Json = 1,
}

impl Format {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct FilterError(String);

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid log filter directive '{}'", self.0)
    }
}

impl std::error::Error for FilterError {}

/// A default level plus module-prefix overrides, e.g. `info,stakd_pos=trace`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Filter {
    pub default: Level,
    pub targets: Vec<(String, Level)>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            default: Level::Info,
            targets: Vec::new(),
        }
    }
}

impl Filter {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let mut filter = Filter::default();
        for directive in raw.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.split_once('=') {
                Some((target, level)) => {
                    let level =
                        Level::parse(level).ok_or_else(|| FilterError(directive.to_string()))?;
                    let target = target.trim();
                    if target.is_empty() {
                        return Err(FilterError(directive.to_string()));
                    }
                    filter.targets.push((target.to_string(), level));
                }
                None => {
                    filter.default =
                        Level::parse(directive).ok_or_else(|| FilterError(directive.to_string()))?;
                }
            }
        }
        // Longest prefix wins.
        filter
            .targets
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(filter)
    }

    pub fn level_for(&self, target: &str) -> Level {
        self.targets
            .iter()
            .find(|(prefix, _)| target.starts_with(prefix.as_str()))
            .map(|(_, level)| *level)
            .unwrap_or(self.default)
    }

    fn max_level(&self) -> Level {
        self.targets
            .iter()
            .map(|(_, level)| *level)
            .fold(self.default, Level::max)
    }
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    pub filter: Filter,
    pub format: Format,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: Filter::default(),
            format: Format::Text,
            timestamps: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturedLog {
    pub ts_ms: u64,
    pub level: Level,
    pub target: &'static str,
    pub msg: String,
}

// Fast path: the most verbose level any target accepts.
static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static FORMAT: AtomicU8 = AtomicU8::new(Format::Text as u8);
static TIMESTAMPS: AtomicBool = AtomicBool::new(true);
static STDERR: AtomicBool = AtomicBool::new(true);
static FILTER: OnceLock<RwLock<Filter>> = OnceLock::new();

static CAPTURE_ON: AtomicBool = AtomicBool::new(false);
static CAPTURE_CAP: AtomicUsize = AtomicUsize::new(0);
static CAPTURE: OnceLock<Mutex<VecDeque<CapturedLog>>> = OnceLock::new();

fn filter_cell() -> &'static RwLock<Filter> {
    FILTER.get_or_init(|| RwLock::new(Filter::default()))
}

pub fn init(config: LogConfig) {
    MAX_LEVEL.store(config.filter.max_level() as u8, Ordering::Relaxed);
    FORMAT.store(config.format as u8, Ordering::Relaxed);
    TIMESTAMPS.store(config.timestamps, Ordering::Relaxed);
    if let Ok(mut guard) = filter_cell().write() {
        *guard = config.filter;
    }
}

pub fn set_stderr_enabled(enabled: bool) {
    STDERR.store(enabled, Ordering::Relaxed);
}

pub fn enable_capture(capacity: usize) {
    if capacity == 0 {
        CAPTURE_ON.store(false, Ordering::Relaxed);
        return;
    }
    CAPTURE_CAP.store(capacity, Ordering::Relaxed);
    CAPTURE.get_or_init(|| Mutex::new(VecDeque::with_capacity(capacity.min(1024))));
    CAPTURE_ON.store(true, Ordering::Relaxed);
}

pub fn disable_capture() {
    CAPTURE_ON.store(false, Ordering::Relaxed);
}

pub fn clear_captured_logs() {
    if let Some(Ok(mut guard)) = CAPTURE.get().map(|buf| buf.lock()) {
        guard.clear();
    }
}

/// The last `limit` captured records, oldest first.
pub fn capture_snapshot(limit: usize) -> Vec<CapturedLog> {
    let Some(Ok(guard)) = CAPTURE.get().map(|buf| buf.lock()) else {
        return Vec::new();
    };
    let start = guard.len().saturating_sub(limit);
    guard.iter().skip(start).cloned().collect()
}

/// Cheap pre-check used by the macros before formatting arguments.
pub fn enabled(level: Level) -> bool {
    level != Level::Off && level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

pub fn target_enabled(level: Level, target: &str) -> bool {
    if !enabled(level) {
        return false;
    }
    match filter_cell().read() {
        Ok(filter) => level <= filter.level_for(target),
        Err(_) => true,
    }
}

pub fn log(
    level: Level,
    target: &'static str,
    file: &'static str,
    line: u32,
    args: fmt::Arguments<'_>,
) {
    if !target_enabled(level, target) {
        return;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let ts_ms: u64 = now.as_millis().try_into().unwrap_or(u64::MAX);
    let msg = args.to_string();

    if STDERR.load(Ordering::Relaxed) {
        let mut out = io::stderr().lock();
        match FORMAT.load(Ordering::Relaxed) {
            1 => {
                let record = json!({
                    "ts_ms": ts_ms,
                    "level": level.as_str(),
                    "target": target,
                    "file": file,
                    "line": line,
                    "msg": msg,
                });
                let _ = writeln!(out, "{record}");
            }
            _ => {
                if TIMESTAMPS.load(Ordering::Relaxed) {
                    let _ = write!(out, "{} ", Timestamp::from_millis(ts_ms));
                }
                let _ = writeln!(out, "{:<5} {target}: {msg}", level.as_str());
            }
        }
    }

    if CAPTURE_ON.load(Ordering::Relaxed) {
        push_capture(CapturedLog {
            ts_ms,
            level,
            target,
            msg,
        });
    }
}

fn push_capture(record: CapturedLog) {
    let Some(Ok(mut guard)) = CAPTURE.get().map(|buf| buf.lock()) else {
        return;
    };
    let cap = CAPTURE_CAP.load(Ordering::Relaxed).max(1);
    guard.push_back(record);
    while guard.len() > cap {
        guard.pop_front();
    }
}

pub fn current_level() -> Level {
    Level::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {{
        if $crate::enabled($level) {
            $crate::log($level, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Error, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Warn, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Info, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Debug, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Trace, $($arg)*);
    }};
}

struct Timestamp {
    secs: u64,
    millis: u64,
}

impl Timestamp {
    fn from_millis(ts_ms: u64) -> Self {
        Self {
            secs: ts_ms / 1000,
            millis: ts_ms % 1000,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = (self.secs / 86_400) as i64;
        let day_secs = self.secs % 86_400;
        let (year, month, day) = civil_from_days(days);
        write!(
            f,
            "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
            day_secs / 3600,
            (day_secs % 3600) / 60,
            day_secs % 60,
            self.millis
        )
    }
}

// Howard Hinnant's days-to-civil conversion.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = i64::from(yoe) + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level() {
        assert_eq!(Level::parse("info"), Some(Level::Info));
        assert_eq!(Level::parse("WARNING"), Some(Level::Warn));
        assert_eq!(Level::parse("off"), Some(Level::Off));
        assert_eq!(Level::parse("nope"), None);
    }

    #[test]
    fn filter_directives() {
        let filter = Filter::parse("warn, stakd_pos=trace ,stakd_pos::modifier=error").expect("filter");
        assert_eq!(filter.default, Level::Warn);
        assert_eq!(filter.level_for("stakd_chainstate::validation"), Level::Warn);
        assert_eq!(filter.level_for("stakd_pos::kernel"), Level::Trace);
        assert_eq!(filter.level_for("stakd_pos::modifier"), Level::Error);
        assert_eq!(filter.max_level(), Level::Trace);
    }

    #[test]
    fn filter_rejects_garbage() {
        assert!(Filter::parse("loud").is_err());
        assert!(Filter::parse("=debug").is_err());
        assert!(Filter::parse("stakd_pos=chatty").is_err());
        assert_eq!(Filter::parse("").expect("empty").default, Level::Info);
    }

    #[test]
    fn timestamp_formats_epoch() {
        assert_eq!(
            Timestamp::from_millis(0).to_string(),
            "1970-01-01T00:00:00.000Z"
        );
        assert_eq!(
            Timestamp::from_millis(1_470_467_000_250).to_string(),
            "2016-08-06T07:03:20.250Z"
        );
    }
}
