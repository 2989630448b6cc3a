//! TOML configuration for `ctcbutton run`
//!
//! ```toml
//! log_dir = ".ctcbutton"
//! seed = 7
//!
//! [experiment]
//! max_rounds = 16
//! initial_state = 1
//! on_unparseable = "stop"
//!
//! [provider]
//! model = "qwen-math-plus"
//! late_model = "deepseek-r1"
//! switch_round = 10
//!
//! [retry]
//! max_attempts = 3
//! backoff_ms = 2000
//! ```

use ctcbutton_agent::{ExperimentConfig, ModelSchedule, RetryPolicy, UnparseablePolicy};
use ctcbutton_core::provider::DASHSCOPE_COMPAT_URL;
use ctcbutton_core::{DeviceState, ProviderConfig};
use ctcbutton_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub experiment: ExperimentConfig,
    pub provider: ProviderSection,
    pub retry: RetrySection,
    /// Where `experiment.json` and `messages.json` are written
    pub log_dir: PathBuf,
    /// Seed for the state sampler; OS entropy when absent
    pub seed: Option<u64>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            experiment: ExperimentConfig::default(),
            provider: ProviderSection::default(),
            retry: RetrySection::default(),
            log_dir: PathBuf::from(".ctcbutton"),
            seed: None,
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::from(e).with_context("path", path.display().to_string()))?;
        Self::from_toml(&contents).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| {
            Error::config_invalid(format!("failed to parse config: {}", e))
                .with_operation("CliConfig::from_toml")
        })?;
        config.experiment.validate()?;
        Ok(config)
    }

    /// The file at `path` if given, defaults otherwise
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub late_model: Option<String>,
    pub switch_round: u32,
    /// Applied to `model` only
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            base_url: DASHSCOPE_COMPAT_URL.to_string(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            model: "qwen-math-plus".to_string(),
            late_model: Some("deepseek-r1".to_string()),
            switch_round: 10,
            temperature: Some(1.7),
            timeout_secs: 300,
        }
    }
}

impl ProviderSection {
    pub fn api_key(&self) -> Result<String> {
        self.api_key_from(|name| std::env::var(name).ok())
    }

    pub fn api_key_from(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        match lookup(&self.api_key_env) {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::config_invalid(format!("API key not set; export {}", self.api_key_env))
                .with_operation("ProviderSection::api_key")
                .with_context("env", self.api_key_env.clone())),
        }
    }

    pub fn provider_config(&self, api_key: String) -> ProviderConfig {
        ProviderConfig::dashscope(api_key)
            .with_base_url(self.base_url.clone())
            .with_model(self.model.clone())
            .with_timeout(self.timeout_secs)
    }

    pub fn schedule(&self) -> ModelSchedule {
        match &self.late_model {
            Some(late) => ModelSchedule::switching(self.model.clone(), late.clone(), self.switch_round),
            None => ModelSchedule::single(self.model.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 1000,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

/// Command-line values that win over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_rounds: Option<u32>,
    pub initial_state: Option<DeviceState>,
    pub on_unparseable: Option<UnparseablePolicy>,
    pub model: Option<String>,
    pub late_model: Option<String>,
    pub base_url: Option<String>,
    pub seed: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, config: &mut CliConfig) {
        if let Some(max_rounds) = self.max_rounds {
            config.experiment.max_rounds = max_rounds;
        }
        if let Some(state) = self.initial_state {
            config.experiment.initial_state = state;
        }
        if let Some(policy) = self.on_unparseable {
            config.experiment.on_unparseable = policy;
        }
        if let Some(model) = self.model {
            config.provider.model = model;
        }
        if let Some(late_model) = self.late_model {
            config.provider.late_model = Some(late_model);
        }
        if let Some(base_url) = self.base_url {
            config.provider.base_url = base_url;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(log_dir) = self.log_dir {
            config.log_dir = log_dir;
        }
    }
}

pub fn parse_policy(value: &str) -> std::result::Result<UnparseablePolicy, String> {
    match value {
        "stop" => Ok(UnparseablePolicy::Stop),
        "retry" => Ok(UnparseablePolicy::Retry),
        other => Err(format!("expected `stop` or `retry`, got `{}`", other)),
    }
}

pub fn parse_state(value: &str) -> std::result::Result<DeviceState, String> {
    let bit: u8 = value.parse().map_err(|_| format!("expected 0 or 1, got `{}`", value))?;
    DeviceState::try_from(bit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctcbutton_error::ErrorKind;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.experiment.max_rounds, 16);
        assert_eq!(config.provider.switch_round, 10);
        assert_eq!(config.log_dir, PathBuf::from(".ctcbutton"));
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = CliConfig::from_toml(
            r#"
            seed = 42

            [experiment]
            max_rounds = 5
            initial_state = 0
            on_unparseable = "retry"

            [provider]
            model = "qwen-max"
            temperature = 0.5

            [retry]
            max_attempts = 3
            backoff_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, Some(42));
        assert_eq!(config.experiment.max_rounds, 5);
        assert_eq!(config.experiment.initial_state, DeviceState::Off);
        assert_eq!(config.experiment.on_unparseable, UnparseablePolicy::Retry);
        assert_eq!(config.experiment.max_attempts_per_round, 8);
        assert_eq!(config.provider.model, "qwen-max");
        assert_eq!(config.provider.late_model.as_deref(), Some("deepseek-r1"));
        assert_eq!(config.retry.policy(), RetryPolicy::new(3, Duration::ZERO));
    }

    #[test]
    fn test_invalid_files_are_config_errors() {
        let err = CliConfig::from_toml("[experiment]\ninitial_state = 2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = CliConfig::from_toml("[experiment]\nmax_attempts_per_round = 0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctcbutton.toml");
        std::fs::write(&path, "log_dir = \"runs/a\"\n").unwrap();

        let config = CliConfig::resolve(Some(&path)).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("runs/a"));

        let err = CliConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_missing_api_key() {
        let section = ProviderSection::default();
        let err = section.api_key_from(|_| None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(err.context_value("env"), Some("DASHSCOPE_API_KEY"));

        assert!(section.api_key_from(|_| Some("  ".into())).is_err());
        assert_eq!(section.api_key_from(|_| Some("sk-1".into())).unwrap(), "sk-1");
    }

    #[test]
    fn test_schedule_and_provider_config() {
        let mut section = ProviderSection::default();
        let schedule = section.schedule();
        assert_eq!(schedule.model_for(9), "qwen-math-plus");
        assert_eq!(schedule.model_for(10), "deepseek-r1");

        section.late_model = None;
        assert_eq!(section.schedule().model_for(100), "qwen-math-plus");

        let provider = section.provider_config("sk-1".into());
        assert_eq!(provider.base_url, DASHSCOPE_COMPAT_URL);
        assert_eq!(provider.timeout_secs, 300);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = CliConfig::default();
        Overrides {
            max_rounds: Some(3),
            initial_state: Some(DeviceState::Off),
            seed: Some(1),
            model: Some("qwen-plus".into()),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.experiment.max_rounds, 3);
        assert_eq!(config.experiment.initial_state, DeviceState::Off);
        assert_eq!(config.seed, Some(1));
        assert_eq!(config.provider.model, "qwen-plus");
        assert_eq!(config.retry, RetrySection::default());
    }

    #[test]
    fn test_flag_parsers() {
        assert_eq!(parse_policy("retry"), Ok(UnparseablePolicy::Retry));
        assert!(parse_policy("ignore").is_err());
        assert_eq!(parse_state("1"), Ok(DeviceState::On));
        assert!(parse_state("2").is_err());
        assert!(parse_state("on").is_err());
    }
}
