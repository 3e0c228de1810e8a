use thiserror::Error;
use url::Url;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_SUBMISSION_TIMEOUT_SECS: u64 = 30;

const TICK_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=10_000;

/// Tunables of the session engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    tick_interval_ms: u64,
    autosave_interval_secs: u64,
    submission_base_url: Option<String>,
    submission_timeout_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct EngineSettingsDraft {
    pub tick_interval_ms: Option<u64>,
    pub autosave_interval_secs: Option<u64>,
    pub submission_base_url: Option<String>,
    pub submission_timeout_secs: Option<u64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("tick interval must be between 100 and 10000 ms")]
    InvalidTickInterval,
    #[error("autosave interval must be at least 1 second")]
    InvalidAutosaveInterval,
    #[error("submission timeout must be at least 1 second")]
    InvalidSubmissionTimeout,
    #[error("invalid submission base URL")]
    InvalidBaseUrl,
}

impl EngineSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize the draft, filling unset fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if an interval is out of range or the base URL
    /// is present but not an absolute http(s) URL.
    pub fn validate(self) -> Result<EngineSettings, SettingsError> {
        let tick_interval_ms = self.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS);
        if !TICK_INTERVAL_RANGE_MS.contains(&tick_interval_ms) {
            return Err(SettingsError::InvalidTickInterval);
        }

        let autosave_interval_secs = self
            .autosave_interval_secs
            .unwrap_or(DEFAULT_AUTOSAVE_INTERVAL_SECS);
        if autosave_interval_secs == 0 {
            return Err(SettingsError::InvalidAutosaveInterval);
        }

        let submission_timeout_secs = self
            .submission_timeout_secs
            .unwrap_or(DEFAULT_SUBMISSION_TIMEOUT_SECS);
        if submission_timeout_secs == 0 {
            return Err(SettingsError::InvalidSubmissionTimeout);
        }

        let submission_base_url = normalize_optional(self.submission_base_url);
        if let Some(raw) = submission_base_url.as_ref() {
            let parsed = Url::parse(raw).map_err(|_| SettingsError::InvalidBaseUrl)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SettingsError::InvalidBaseUrl);
            }
        }

        Ok(EngineSettings {
            tick_interval_ms,
            autosave_interval_secs,
            submission_base_url,
            submission_timeout_secs,
        })
    }
}

impl EngineSettings {
    /// Rehydrate settings from storage, re-running validation.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the stored values are no longer valid.
    pub fn from_persisted(draft: EngineSettingsDraft) -> Result<Self, SettingsError> {
        draft.validate()
    }

    #[must_use]
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    #[must_use]
    pub fn autosave_interval_secs(&self) -> u64 {
        self.autosave_interval_secs
    }

    #[must_use]
    pub fn submission_base_url(&self) -> Option<&str> {
        self.submission_base_url.as_deref()
    }

    #[must_use]
    pub fn submission_timeout_secs(&self) -> u64 {
        self.submission_timeout_secs
    }

    /// Returns a draft seeded with these values, for editing.
    #[must_use]
    pub fn to_draft(&self) -> EngineSettingsDraft {
        EngineSettingsDraft {
            tick_interval_ms: Some(self.tick_interval_ms),
            autosave_interval_secs: Some(self.autosave_interval_secs),
            submission_base_url: self.submission_base_url.clone(),
            submission_timeout_secs: Some(self.submission_timeout_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
            submission_base_url: None,
            submission_timeout_secs: DEFAULT_SUBMISSION_TIMEOUT_SECS,
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
