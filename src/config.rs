#[cfg(test)]
mod tests;

use {
    serde::{Deserialize, Deserializer, de::Error as _},
    std::{fs, io, path::Path, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {0}")]
    Read(String, #[source] io::Error),
    #[error("Could not parse {0}")]
    Parse(String, #[source] serde_json::Error),
}

/// Tunables of the apply pipeline.
///
/// Every field can be omitted from the config file. Durations are written in humantime
/// notation, e.g. `"100ms"` or `"1s 500ms"`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ApplyConfig {
    /// How long a power transition waits for its vsync or frame-done signal.
    #[serde(deserialize_with = "duration")]
    pub power_timeout: Duration,
    /// How often `flush` re-checks a pipe before giving up.
    pub flush_retries: u32,
    /// How long `flush` sleeps between two checks.
    #[serde(deserialize_with = "duration")]
    pub flush_interval: Duration,
    /// Capacity of the irq dispatcher, counting handlers and waits.
    pub max_irq_handlers: usize,
    /// Frame period of the simulated display controller.
    #[serde(deserialize_with = "duration")]
    pub vsync_interval: Duration,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            power_timeout: Duration::from_millis(100),
            flush_retries: 10,
            flush_interval: Duration::from_millis(20),
            max_irq_handlers: 32,
            vsync_interval: Duration::from_millis(16),
        }
    }
}

impl ApplyConfig {
    pub fn parse(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let s = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => return Err(ConfigError::Read(display, e)),
        };
        Self::parse(&s).map_err(|e| ConfigError::Parse(display, e))
    }
}

fn duration<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(d)?;
    humantime::parse_duration(&s).map_err(D::Error::custom)
}
