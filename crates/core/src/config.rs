use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub vector: VectorConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct VectorConfig {
    pub service_url: Option<String>,
    pub timeout_secs: u64,
    pub search_limit: u32,
    pub score_threshold: f32,
    pub retry_backoff_ms: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// History turns fed to classification and sub-agents.
    pub history_window: usize,
    /// Narrower window for the response composition stage.
    pub response_history_window: usize,
    /// Upper bound per outbound message fragment.
    pub max_segment_chars: usize,
    pub rag_failure_reply: String,
    pub generic_reply: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://prospera.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig { model: "gpt-4o-mini".to_string(), api_key: None, timeout_secs: 30 },
            vector: VectorConfig {
                service_url: None,
                timeout_secs: 10,
                search_limit: 5,
                score_threshold: 0.35,
                retry_backoff_ms: 400,
            },
            pipeline: PipelineConfig {
                history_window: 30,
                response_history_window: 6,
                max_segment_chars: 400,
                rag_failure_reply: "En este momento no puedo revisar la información de los \
                                    proyectos. Un asesor te responderá a la brevedad."
                    .to_string(),
                generic_reply: "Hemos recibido tu mensaje y lo estamos procesando. En breve \
                                continuaré con los siguientes pasos."
                    .to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database: Option<FileDatabase>,
    llm: Option<FileLlm>,
    vector: Option<FileVector>,
    pipeline: Option<FilePipeline>,
    logging: Option<FileLogging>,
}

#[derive(Debug, Default, Deserialize)]
struct FileDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLlm {
    model: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileVector {
    service_url: Option<String>,
    timeout_secs: Option<u64>,
    search_limit: Option<u32>,
    score_threshold: Option<f32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FilePipeline {
    history_window: Option<usize>,
    response_history_window: Option<usize>,
    max_segment_chars: Option<usize>,
    rag_failure_reply: Option<String>,
    generic_reply: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogging {
    level: Option<String>,
    format: Option<String>,
}

impl AppConfig {
    /// Defaults, then the TOML file (if any), then `PROSPERA_*` environment
    /// overrides, then validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(options, &env)
    }

    pub fn load_with_env(
        options: LoadOptions,
        env: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(&options, env) {
            if path.exists() {
                let raw = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?;
                let file: FileConfig = toml::from_str(&raw)
                    .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
                config.apply_file(file)?;
            } else if options.require_file {
                return Err(ConfigError::MissingConfigFile(path));
            }
        }

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(database) = file.database {
            apply(&mut self.database.url, database.url);
            apply(&mut self.database.max_connections, database.max_connections);
            apply(&mut self.database.timeout_secs, database.timeout_secs);
        }
        if let Some(llm) = file.llm {
            apply(&mut self.llm.model, llm.model);
            if let Some(key) = llm.api_key {
                self.llm.api_key = Some(key.into());
            }
            apply(&mut self.llm.timeout_secs, llm.timeout_secs);
        }
        if let Some(vector) = file.vector {
            if let Some(url) = vector.service_url {
                self.vector.service_url = Some(url);
            }
            apply(&mut self.vector.timeout_secs, vector.timeout_secs);
            apply(&mut self.vector.search_limit, vector.search_limit);
            apply(&mut self.vector.score_threshold, vector.score_threshold);
            apply(&mut self.vector.retry_backoff_ms, vector.retry_backoff_ms);
        }
        if let Some(pipeline) = file.pipeline {
            apply(&mut self.pipeline.history_window, pipeline.history_window);
            apply(&mut self.pipeline.response_history_window, pipeline.response_history_window);
            apply(&mut self.pipeline.max_segment_chars, pipeline.max_segment_chars);
            apply(&mut self.pipeline.rag_failure_reply, pipeline.rag_failure_reply);
            apply(&mut self.pipeline.generic_reply, pipeline.generic_reply);
        }
        if let Some(logging) = file.logging {
            apply(&mut self.logging.level, logging.level);
            if let Some(format) = logging.format {
                self.logging.format = format.parse()?;
            }
        }
        Ok(())
    }

    fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(url) = env.get("PROSPERA_DATABASE_URL") {
            self.database.url = url.clone();
        }
        if let Some(value) = env.get("PROSPERA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("PROSPERA_DATABASE_MAX_CONNECTIONS", value)?;
        }
        if let Some(model) = env.get("PROSPERA_LLM_MODEL") {
            self.llm.model = model.clone();
        }
        if let Some(key) = env.get("PROSPERA_LLM_API_KEY") {
            self.llm.api_key = Some(key.clone().into());
        }
        if let Some(value) = env.get("PROSPERA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("PROSPERA_LLM_TIMEOUT_SECS", value)?;
        }
        if let Some(url) = env.get("PROSPERA_VECTOR_SERVICE_URL") {
            self.vector.service_url =
                if url.trim().is_empty() { None } else { Some(url.clone()) };
        }
        if let Some(value) = env.get("PROSPERA_VECTOR_TIMEOUT_SECS") {
            self.vector.timeout_secs = parse_env("PROSPERA_VECTOR_TIMEOUT_SECS", value)?;
        }
        if let Some(value) = env.get("PROSPERA_HISTORY_WINDOW") {
            self.pipeline.history_window = parse_env("PROSPERA_HISTORY_WINDOW", value)?;
        }
        if let Some(value) = env.get("PROSPERA_MAX_SEGMENT_CHARS") {
            self.pipeline.max_segment_chars = parse_env("PROSPERA_MAX_SEGMENT_CHARS", value)?;
        }
        if let Some(level) = env.get("PROSPERA_LOG_LEVEL") {
            self.logging.level = level.clone();
        }
        if let Some(format) = env.get("PROSPERA_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".into()));
        }
        if self.pipeline.history_window == 0 {
            return Err(ConfigError::Validation("pipeline.history_window must be >= 1".into()));
        }
        if self.pipeline.response_history_window > self.pipeline.history_window {
            return Err(ConfigError::Validation(
                "pipeline.response_history_window cannot exceed pipeline.history_window".into(),
            ));
        }
        if self.pipeline.max_segment_chars < 80 {
            return Err(ConfigError::Validation(
                "pipeline.max_segment_chars must be at least 80".into(),
            ));
        }
        if self.llm.timeout_secs == 0 || self.vector.timeout_secs == 0 {
            return Err(ConfigError::Validation("timeouts must be at least 1 second".into()));
        }
        Ok(())
    }
}

fn resolve_config_path(options: &LoadOptions, env: &HashMap<String, String>) -> Option<PathBuf> {
    options
        .config_path
        .clone()
        .or_else(|| env.get("PROSPERA_CONFIG").map(PathBuf::from))
        .or_else(|| Some(PathBuf::from("prospera.toml")))
}

fn apply<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}
