use std::time::Duration;

use gestu_core::BackoffPolicy;
use gestu_core::endpoint;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_API_PREFIX: &str = "/api/v1";
pub const DEFAULT_FPS: u32 = 15;
pub const DEFAULT_FRAME_SIZE: u32 = 224;
pub const DEFAULT_JPEG_QUALITY: u8 = 75;
pub const DEFAULT_BACKLOG_BYTES: usize = 1_000_000;
pub const DEFAULT_DB_URL: &str = "sqlite://gestu.sqlite3";
pub const DEFAULT_PROGRESS_KEY: &str = "gestu_completed_keys";

/// Unvalidated client settings, usually read from `GESTU_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfigDraft {
    pub base_url: String,
    pub api_prefix: String,
    pub fps: u32,
    pub frame_size: u32,
    pub jpeg_quality: u8,
    pub backlog_bytes: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_cap: u32,
    pub db_url: String,
    pub progress_key: String,
}

impl Default for ClientConfigDraft {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            fps: DEFAULT_FPS,
            frame_size: DEFAULT_FRAME_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            backlog_bytes: DEFAULT_BACKLOG_BYTES,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            backoff_cap: BackoffPolicy::DEFAULT_CAP_ATTEMPT,
            db_url: DEFAULT_DB_URL.to_string(),
            progress_key: DEFAULT_PROGRESS_KEY.to_string(),
        }
    }
}

impl ClientConfigDraft {
    /// Read overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through an arbitrary lookup; unset or blank names keep defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a numeric variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut draft = Self::default();

        if let Some(value) = get("GESTU_BASE_URL") {
            draft.base_url = value;
        }
        if let Some(value) = get("GESTU_API_PREFIX") {
            draft.api_prefix = value;
        }
        if let Some(value) = get("GESTU_DB_URL") {
            draft.db_url = value;
        }
        if let Some(value) = get("GESTU_PROGRESS_KEY") {
            draft.progress_key = value;
        }
        parse_into(&get, "GESTU_FPS", &mut draft.fps)?;
        parse_into(&get, "GESTU_FRAME_SIZE", &mut draft.frame_size)?;
        parse_into(&get, "GESTU_JPEG_QUALITY", &mut draft.jpeg_quality)?;
        parse_into(&get, "GESTU_BACKLOG_BYTES", &mut draft.backlog_bytes)?;
        parse_into(&get, "GESTU_BACKOFF_BASE_MS", &mut draft.backoff_base_ms)?;
        parse_into(&get, "GESTU_BACKOFF_MAX_MS", &mut draft.backoff_max_ms)?;
        parse_into(&get, "GESTU_BACKOFF_CAP", &mut draft.backoff_cap)?;

        Ok(draft)
    }

    /// Check ranges and resolve endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for out-of-range numbers or unusable URLs.
    pub fn validate(self) -> Result<ClientConfig, ConfigError> {
        check_range("fps", u64::from(self.fps), 1, 60)?;
        check_range("frame_size", u64::from(self.frame_size), 32, 1024)?;
        check_range("jpeg_quality", u64::from(self.jpeg_quality), 1, 100)?;
        check_range("backoff_base_ms", self.backoff_base_ms, 1, 60_000)?;
        check_range(
            "backoff_max_ms",
            self.backoff_max_ms,
            self.backoff_base_ms,
            600_000,
        )?;
        if self.progress_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "progress_key",
                value: self.progress_key,
            });
        }

        let base_url = endpoint::parse_base(&self.base_url)?;
        let inference_url = endpoint::inference_url(&base_url)?;
        let api_prefix = normalize_prefix(&self.api_prefix);

        Ok(ClientConfig {
            base_url,
            inference_url,
            api_prefix,
            fps: self.fps,
            frame_size: self.frame_size,
            jpeg_quality: self.jpeg_quality,
            backlog_bytes: self.backlog_bytes,
            backoff: BackoffPolicy::new(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_max_ms),
                self.backoff_cap,
            ),
            db_url: self.db_url,
            progress_key: self.progress_key.trim().to_string(),
        })
    }
}

/// Validated client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: Url,
    inference_url: Url,
    api_prefix: String,
    fps: u32,
    frame_size: u32,
    jpeg_quality: u8,
    backlog_bytes: usize,
    backoff: BackoffPolicy,
    db_url: String,
    progress_key: String,
}

impl ClientConfig {
    /// Defaults plus `GESTU_*` overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any variable is unparsable or out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        ClientConfigDraft::from_env()?.validate()
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full `ws(s)://host/ws/gesture` URL.
    #[must_use]
    pub fn inference_url(&self) -> &Url {
        &self.inference_url
    }

    #[must_use]
    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    #[must_use]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    #[must_use]
    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    #[must_use]
    pub fn backlog_bytes(&self) -> usize {
        self.backlog_bytes
    }

    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    #[must_use]
    pub fn db_url(&self) -> &str {
        &self.db_url
    }

    #[must_use]
    pub fn progress_key(&self) -> &str {
        &self.progress_key
    }

    /// Point the client at another host.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Endpoint` if the scheme cannot carry the inference channel.
    pub fn with_base_url(mut self, base_url: Url) -> Result<Self, ConfigError> {
        self.inference_url = endpoint::inference_url(&base_url)?;
        self.base_url = base_url;
        Ok(self)
    }

    #[must_use]
    pub fn with_db_url(mut self, db_url: impl Into<String>) -> Self {
        self.db_url = db_url.into();
        self
    }
}

fn parse_into<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = get(name) {
        *slot = raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw })?;
    }
    Ok(())
}

fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_validate() {
        let config = ClientConfigDraft::from_lookup(|_| None)
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(config.fps(), 15);
        assert_eq!(config.frame_size(), 224);
        assert_eq!(config.jpeg_quality(), 75);
        assert_eq!(config.backlog_bytes(), 1_000_000);
        assert_eq!(config.inference_url().as_str(), "ws://127.0.0.1:8000/ws/gesture");
        assert_eq!(config.api_prefix(), "/api/v1");
        assert_eq!(config.progress_key(), "gestu_completed_keys");
        assert_eq!(config.backoff(), BackoffPolicy::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = ClientConfigDraft::from_lookup(lookup(&[
            ("GESTU_BASE_URL", "https://gestures.example.org"),
            ("GESTU_FPS", " 10 "),
            ("GESTU_BACKOFF_MAX_MS", "4000"),
            ("GESTU_API_PREFIX", "api/v2/"),
        ]))
        .unwrap()
        .validate()
        .unwrap();
        assert_eq!(
            config.inference_url().as_str(),
            "wss://gestures.example.org/ws/gesture"
        );
        assert_eq!(config.fps(), 10);
        assert_eq!(config.backoff().max(), Duration::from_secs(4));
        assert_eq!(config.api_prefix(), "/api/v2");
    }

    #[test]
    fn unparsable_number_is_rejected() {
        let err = ClientConfigDraft::from_lookup(lookup(&[("GESTU_FPS", "fast")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "GESTU_FPS",
                value: "fast".to_string()
            }
        );
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let draft = ClientConfigDraft {
            fps: 0,
            ..ClientConfigDraft::default()
        };
        assert!(matches!(
            draft.validate(),
            Err(ConfigError::OutOfRange { name: "fps", .. })
        ));

        let draft = ClientConfigDraft {
            backoff_base_ms: 2_000,
            backoff_max_ms: 1_000,
            ..ClientConfigDraft::default()
        };
        assert!(matches!(
            draft.validate(),
            Err(ConfigError::OutOfRange {
                name: "backoff_max_ms",
                ..
            })
        ));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let draft = ClientConfigDraft {
            base_url: "ftp://example.org".to_string(),
            ..ClientConfigDraft::default()
        };
        assert!(matches!(draft.validate(), Err(ConfigError::Endpoint(_))));
    }
}
