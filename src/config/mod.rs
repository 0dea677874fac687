//! Backend configuration and the process-wide demo/live decision.
//!
//! The two settings are optional. When either one is missing (or blank) the
//! process runs in [`Mode::Demo`]: every read is served from fixtures and no
//! network or push-channel activity takes place. The mode is computed once and
//! then passed by value to every component that needs it.

use std::fmt;
use tracing::{info, warn};

/// Environment variable holding the backend base URL.
pub const BACKEND_URL_VAR: &str = "TVA_BACKEND_URL";

/// Environment variable holding the backend's public (anon) key.
pub const BACKEND_KEY_VAR: &str = "TVA_BACKEND_KEY";

/// Whether a real backend is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No backend configured; fixtures only.
    Demo,
    /// Reads go to the configured backend.
    Live,
}

impl Mode {
    pub fn is_demo(self) -> bool {
        matches!(self, Mode::Demo)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Demo => f.write_str("demo"),
            Mode::Live => f.write_str("live"),
        }
    }
}

/// Connection settings for the backend data store.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub backend_key: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("backend_key", &self.backend_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `TVA_BACKEND_URL`
    /// - `TVA_BACKEND_KEY`
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(BACKEND_URL_VAR).ok(),
            std::env::var(BACKEND_KEY_VAR).ok(),
        )
    }

    /// Build config from raw values. Blank values are treated as absent.
    pub fn from_vars(url: Option<String>, key: Option<String>) -> Self {
        Self {
            backend_url: non_blank(url),
            backend_key: non_blank(key),
        }
    }

    /// Resolves the process mode. Live only when both settings are present.
    pub fn mode(&self) -> Mode {
        match (&self.backend_url, &self.backend_key) {
            (Some(url), Some(_)) => {
                info!(%url, "Backend configured");
                Mode::Live
            }
            _ => {
                warn!("Backend not configured, running in demo mode with fixture data");
                Mode::Demo
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_values_present_is_live() {
        let cfg = Config::from_vars(
            Some("https://db.example.com".into()),
            Some("anon-key".into()),
        );
        assert_eq!(cfg.mode(), Mode::Live);
    }

    #[test]
    fn missing_url_is_demo() {
        let cfg = Config::from_vars(None, Some("anon-key".into()));
        assert_eq!(cfg.mode(), Mode::Demo);
    }

    #[test]
    fn missing_key_is_demo() {
        let cfg = Config::from_vars(Some("https://db.example.com".into()), None);
        assert_eq!(cfg.mode(), Mode::Demo);
    }

    #[test]
    fn blank_values_count_as_absent() {
        let cfg = Config::from_vars(Some("   ".into()), Some(String::new()));
        assert_eq!(cfg, Config::default());
        assert!(cfg.mode().is_demo());
    }

    #[test]
    fn debug_output_redacts_key() {
        let cfg = Config::from_vars(Some("https://db.example.com".into()), Some("secret".into()));
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
