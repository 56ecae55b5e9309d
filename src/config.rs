use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::coach::{ChatModelConfig, EngineConfig};
use crate::error::CoachError;
use crate::pipeline::PipelineConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub realtime: RealtimeConfig,
    pub coach: CoachConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct RealtimeConfig {
    pub base_url: String,
    /// Long-lived provider key. Left empty in the file; falls back to
    /// OPENAI_API_KEY at load time.
    #[serde(default)]
    pub api_key: String,
    pub transcription_model: String,
    #[serde(default)]
    pub vocabulary_prompt: Option<String>,
    pub silence_duration_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct CoachConfig {
    pub chat_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub analysis_interval_secs: u64,
    pub min_entries: usize,
    pub snapshot_entries: usize,
    pub retention_secs: u64,
    pub suggestion_ttl_secs: u64,
    pub model_timeout_secs: u64,
}

/// Optional JSON files standing in for the CRUD store.
#[derive(Debug, Default, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub persona_file: Option<PathBuf>,
    #[serde(default)]
    pub playbook_file: Option<PathBuf>,
    #[serde(default)]
    pub knowledge_file: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;

        if cfg.realtime.api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                cfg.realtime.api_key = key;
            }
        }

        Ok(cfg)
    }

    /// Startup validation: a misconfiguration must prevent session start
    /// rather than fail mid-stream.
    pub fn validate(&self) -> Result<(), CoachError> {
        if self.realtime.api_key.trim().is_empty() {
            return Err(CoachError::Configuration(
                "no provider API key: set realtime.api_key or OPENAI_API_KEY".into(),
            ));
        }
        if self.coach.min_entries == 0 {
            return Err(CoachError::Configuration(
                "coach.min_entries must be at least 1".into(),
            ));
        }
        if self.coach.snapshot_entries == 0 {
            return Err(CoachError::Configuration(
                "coach.snapshot_entries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            transcription_model: self.realtime.transcription_model.clone(),
            vocabulary_prompt: self.realtime.vocabulary_prompt.clone(),
            silence_duration_ms: self.realtime.silence_duration_ms,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            analysis_interval: Duration::from_secs(self.coach.analysis_interval_secs),
            min_entries: self.coach.min_entries,
            snapshot_entries: self.coach.snapshot_entries,
            retention_window: Duration::from_secs(self.coach.retention_secs),
            suggestion_ttl: Duration::from_secs(self.coach.suggestion_ttl_secs),
            knowledge_limit: 3,
            model_timeout: Duration::from_secs(self.coach.model_timeout_secs),
        }
    }

    pub fn chat_model_config(&self) -> ChatModelConfig {
        ChatModelConfig {
            base_url: self.realtime.base_url.clone(),
            api_key: self.realtime.api_key.clone(),
            model: self.coach.chat_model.clone(),
            temperature: self.coach.temperature,
            max_output_tokens: self.coach.max_output_tokens,
            request_timeout: Duration::from_secs(self.coach.model_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[service]
name = "meet-coach"

[service.http]
bind = "127.0.0.1"
port = 3927

[realtime]
base_url = "https://api.openai.com"
api_key = "sk-test"
transcription_model = "gpt-4o-transcribe"
silence_duration_ms = 10

[coach]
chat_model = "gpt-4o-mini"
temperature = 0.7
max_output_tokens = 300
analysis_interval_secs = 10
min_entries = 3
snapshot_entries = 10
retention_secs = 120
suggestion_ttl_secs = 12
model_timeout_secs = 30
"#;

    fn write_sample(dir: &tempfile::TempDir, contents: &str) -> String {
        let path = dir.path().join("meet-coach.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.with_extension("").to_string_lossy().into_owned()
    }

    #[test]
    fn loads_and_validates_a_complete_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_sample(&dir, SAMPLE);

        let cfg = Config::load(&path).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.service.http.port, 3927);
        assert_eq!(cfg.realtime.silence_duration_ms, 10);
        assert_eq!(cfg.engine_config().min_entries, 3);
        assert_eq!(
            cfg.engine_config().analysis_interval,
            Duration::from_secs(10)
        );
        assert!((cfg.chat_model_config().temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_api_key_fails_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_sample(&dir, &SAMPLE.replace("api_key = \"sk-test\"\n", ""));

        // Only meaningful when the environment provides no fallback key
        if std::env::var("OPENAI_API_KEY").is_ok() {
            return;
        }

        let cfg = Config::load(&path).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, CoachError::Configuration(_)));
    }
}
