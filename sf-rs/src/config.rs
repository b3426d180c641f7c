//! `sfrc` runtime configuration.
//!
//! One `name = value` setting per line:
//!
//! | Key | Value | Default |
//! |-----|-------|---------|
//! | `max_loop_time` | microseconds, `0` disables the loop timer | `0` |
//! | `trace` | `0`/`1` per-instruction tracing | `0` |
//! | `listing` | `0`/`1` compile listing to the script output | `0` |
//! | `script_name` | name for `writelog` and debug text | script file stem |
//! | `log` | default tracing filter | `warn` |
//!
//! Lines starting with `;` or `#` are comments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;

use crate::script::value::parse_c_long;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub max_loop_time: Option<Duration>,
    pub trace: bool,
    pub listing: bool,
    pub script_name: Option<String>,
    pub log: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_loop_time: None,
            trace: false,
            listing: false,
            script_name: None,
            log: "warn".to_owned(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config text.  Bad lines are reported and skipped; the rest
    /// still applies.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Err(message) = config.apply(line) {
                errors.push(ConfigError { line: i + 1, message });
            }
        }

        (config, errors)
    }

    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    fn apply(&mut self, line: &str) -> Result<(), String> {
        let Some((name, value)) = line.split_once('=') else {
            return Err(format!("expected 'name = value', got '{line}'"));
        };
        let (name, value) = (name.trim(), value.trim());
        match name {
            "max_loop_time" => {
                let us = number(name, value)?;
                if us < 0 {
                    return Err(format!("{name}: must not be negative"));
                }
                self.max_loop_time = (us > 0).then(|| Duration::from_micros(us as u64));
            }
            "trace" => self.trace = number(name, value)? != 0,
            "listing" => self.listing = number(name, value)? != 0,
            "script_name" => self.script_name = Some(unquote(value).to_owned()),
            "log" => self.log = unquote(value).to_owned(),
            _ => return Err(format!("unknown setting '{name}'")),
        }
        Ok(())
    }
}

fn number(name: &str, value: &str) -> Result<i64, String> {
    let (n, end) = parse_c_long(value);
    if end == 0 || end != value.len() {
        return Err(format!("{name}: '{value}' is not a number"));
    }
    Ok(n)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// The per-user config file, `<config dir>/sf/sfrc`, if it exists.
pub fn find_user_config() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "sf")?;
    let path = dirs.config_dir().join("sfrc");
    path.exists().then_some(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let (cfg, errs) = Config::load_str("");
        assert!(errs.is_empty());
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.log, "warn");
    }

    #[test]
    fn all_keys() {
        let src = "\
; sf settings\n\
# loop timer in microseconds\n\
max_loop_time = 250000\n\
trace=1\n\
listing = 0x1\n\
script_name = \"pump control\"\n\
log = sf=debug\n";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.max_loop_time, Some(Duration::from_millis(250)));
        assert!(cfg.trace);
        assert!(cfg.listing);
        assert_eq!(cfg.script_name.as_deref(), Some("pump control"));
        assert_eq!(cfg.log, "sf=debug");
    }

    #[test]
    fn zero_disables_loop_timer() {
        let (cfg, _) = Config::load_str("max_loop_time = 5\nmax_loop_time = 0");
        assert_eq!(cfg.max_loop_time, None);
    }

    #[test]
    fn bad_lines_are_reported_and_skipped() {
        let (cfg, errs) = Config::load_str("trace = yes\ncolour = 1\nlisting\nmax_loop_time = -3\nlisting = 1");
        assert_eq!(errs.len(), 4);
        assert_eq!(errs.iter().map(|e| e.line).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(errs[1].to_string().contains("unknown setting 'colour'"));
        assert!(!cfg.trace);
        assert!(cfg.listing);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "trace = 1").unwrap();
        let (cfg, errs) = Config::load_file(file.path()).unwrap();
        assert!(errs.is_empty());
        assert!(cfg.trace);
        assert!(Config::load_file(Path::new("/nonexistent/sfrc")).is_err());
    }
}
