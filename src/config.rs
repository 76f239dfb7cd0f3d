//! Config module.
//! Reads the API credential and tuning knobs from the process environment
//! (a `.env` file is loaded first by `main`). CLI flags override these.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::time::Duration;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Screen rectangle to crop captured frames to: (x, y, width, height).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl std::str::FromStr for CaptureRegion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Capture region '{}' must be four integers x,y,w,h", s))?;
        let &[x, y, width, height] = parts.as_slice() else {
            bail!("Capture region '{}' must be four integers x,y,w,h", s);
        };
        if width == 0 || height == 0 {
            bail!("Capture region '{}' has zero size", s);
        }
        Ok(Self { x, y, width, height })
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub timeout: Duration,
    pub output_dir: PathBuf,
    pub monitor_index: usize,
    pub capture_region: Option<CaptureRegion>,
    pub share_command: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, so tests don't touch the real environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_secs = match non_empty("CLICKCHESS_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("CLICKCHESS_TIMEOUT_SECS '{}' is not a number of seconds", v))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let monitor_index = match non_empty("CLICKCHESS_MONITOR") {
            Some(v) => v
                .parse::<usize>()
                .with_context(|| format!("CLICKCHESS_MONITOR '{}' is not a monitor index", v))?,
            None => 0,
        };
        let capture_region = non_empty("CLICKCHESS_CAPTURE_REGION")
            .map(|v| v.parse::<CaptureRegion>())
            .transpose()?;

        Ok(Self {
            api_key: lookup(API_KEY_VAR),
            api_url: non_empty("CLICKCHESS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: non_empty("CLICKCHESS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            output_dir: non_empty("CLICKCHESS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            monitor_index,
            capture_region,
            share_command: non_empty("CLICKCHESS_SHARE_COMMAND"),
        })
    }

    /// The API key, if it is usable.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| credential_is_usable(Some(*key)))
    }
}

/// Empty values and the literal `undefined` left behind by unset
/// deployment variables count as missing.
pub fn credential_is_usable(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") | Some("undefined") => false,
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.monitor_index, 0);
        assert!(config.capture_region.is_none());
        assert!(config.share_command.is_none());
        assert!(config.credential().is_none());
    }

    #[test]
    fn test_credential_gating() {
        assert!(!credential_is_usable(None));
        assert!(!credential_is_usable(Some("")));
        assert!(!credential_is_usable(Some("   ")));
        assert!(!credential_is_usable(Some("undefined")));
        assert!(credential_is_usable(Some("sk-test")));

        let config = config_from(&[(API_KEY_VAR, "undefined")]).unwrap();
        assert!(config.credential().is_none());
        let config = config_from(&[(API_KEY_VAR, "sk-abc")]).unwrap();
        assert_eq!(config.credential(), Some("sk-abc"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("CLICKCHESS_MODEL", "gpt-4o-mini"),
            ("CLICKCHESS_TIMEOUT_SECS", "15"),
            ("CLICKCHESS_OUTPUT_DIR", "/tmp/games"),
            ("CLICKCHESS_MONITOR", "1"),
            ("CLICKCHESS_CAPTURE_REGION", "10, 20, 800, 600"),
            ("CLICKCHESS_SHARE_COMMAND", "termux-share -a send"),
        ])
        .unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/games"));
        assert_eq!(config.monitor_index, 1);
        assert_eq!(
            config.capture_region,
            Some(CaptureRegion { x: 10, y: 20, width: 800, height: 600 })
        );
        assert_eq!(config.share_command.as_deref(), Some("termux-share -a send"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_from(&[("CLICKCHESS_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config_from(&[("CLICKCHESS_CAPTURE_REGION", "1,2,3")]).is_err());
        assert!(config_from(&[("CLICKCHESS_CAPTURE_REGION", "1,2,0,4")]).is_err());
    }
}
