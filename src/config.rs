use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLM_API_URL: &str = "https://ws-01.olmocr.huannago.com/v1/chat/completions";
const DEFAULT_OLM_MODEL: &str = "allenai/olmOCR-2-7B-1025-FP8";
const DEFAULT_VLM_API_URL: &str = "https://ws-02.wade0426.me/v1/chat/completions";
const DEFAULT_VLM_MODEL: &str = "gemma-3-27b-it";
const DEFAULT_EMBED_API_URL: &str = "https://ws-04.wade0426.me/embed";
const DEFAULT_EMBED_TASK_DESCRIPTION: &str = "檢索技術文件";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// The configuration cache was initialized twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the ingestion server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding `uploads/`, `lineage/`, and the job table.
    pub data_dir: PathBuf,
    /// Chat-completions endpoint of the OCR model.
    pub olm_api_url: String,
    /// OCR model identifier.
    pub olm_model: String,
    /// Chat-completions endpoint of the vision-language model.
    pub vlm_api_url: String,
    /// Vision-language model identifier.
    pub vlm_model: String,
    /// Chat-completions endpoint used for GraphRAG answers, if configured.
    pub llm_api_url: Option<String>,
    /// Text-generation model identifier, if configured.
    pub llm_model: Option<String>,
    /// Embedding service endpoint.
    pub embed_api_url: String,
    /// Task description forwarded with every embedding request.
    pub embed_task_description: String,
    /// Whether the embedding service should L2-normalize vectors.
    pub embed_normalize: bool,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection: String,
    /// Dimensionality of the stored vectors.
    pub qdrant_vector_size: u64,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Base URL of the Neo4j HTTP endpoint.
    pub neo4j_url: String,
    /// Neo4j user name.
    pub neo4j_user: String,
    /// Neo4j password.
    pub neo4j_password: String,
    /// Neo4j database name.
    pub neo4j_database: String,
    /// Character window used by the chunker.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Maximum attempts for calls to volatile upstream services.
    pub http_retry_attempts: u32,
    /// Delay before the first retry; doubled on each subsequent attempt.
    pub http_retry_base_delay: Duration,
    /// Resolution used when rasterizing PDF pages.
    pub render_dpi: u32,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: PathBuf::from(load_env_or("DATA_DIR", "./data")),
            olm_api_url: load_env_or("OLM_API_URL", DEFAULT_OLM_API_URL),
            olm_model: load_env_or("OLM_MODEL", DEFAULT_OLM_MODEL),
            vlm_api_url: load_env_or("VLM_API_URL", DEFAULT_VLM_API_URL),
            vlm_model: load_env_or("VLM_MODEL", DEFAULT_VLM_MODEL),
            llm_api_url: load_env_optional("LLM_API_URL"),
            llm_model: load_env_optional("LLM_MODEL"),
            embed_api_url: load_env_or("EMBED_API_URL", DEFAULT_EMBED_API_URL),
            embed_task_description: load_env_or(
                "EMBED_TASK_DESCRIPTION",
                DEFAULT_EMBED_TASK_DESCRIPTION,
            ),
            embed_normalize: parse_bool("EMBED_NORMALIZE", true)?,
            qdrant_url: load_env_or("QDRANT_URL", "http://localhost:6333"),
            qdrant_collection: load_env_or("QDRANT_COLLECTION", "idp_docs"),
            qdrant_vector_size: parse_or("QDRANT_VECTOR_SIZE", 1024)?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            neo4j_url: load_env_or("NEO4J_URL", "http://localhost:7474"),
            neo4j_user: load_env_or("NEO4J_USER", "neo4j"),
            neo4j_password: load_env_or("NEO4J_PASSWORD", "password"),
            neo4j_database: load_env_or("NEO4J_DATABASE", "neo4j"),
            chunk_size: parse_or("CHUNK_SIZE", 800)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", 120)?,
            http_retry_attempts: parse_or("HTTP_RETRY_ATTEMPTS", 3)?,
            http_retry_base_delay: Duration::from_millis(parse_or(
                "HTTP_RETRY_BASE_DELAY_MS",
                1000,
            )?),
            render_dpi: parse_or("RENDER_DPI", 200)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
        .and_then(Self::validated)
    }

    /// Directory receiving uploaded source files.
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory receiving one lineage manifest per job.
    pub fn lineage_dir(&self) -> PathBuf {
        self.data_dir.join("lineage")
    }

    /// Path of the persisted job table.
    pub fn job_table_path(&self) -> PathBuf {
        self.data_dir.join("jobs.json")
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.qdrant_vector_size == 0 {
            return Err(ConfigError::InvalidValue("QDRANT_VECTOR_SIZE".into()));
        }
        Ok(self)
    }
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// Variables are read after an optional dotenv file; `env_file` overrides the default `.env`
/// lookup in the working directory.
pub fn init_config(env_file: Option<&Path>) -> Result<&'static Config, ConfigError> {
    match env_file {
        Some(path) => {
            if let Err(error) = dotenvy::from_path(path) {
                tracing::warn!(path = %path.display(), error = %error, "Failed to read env file");
            }
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    let config = Config::from_env()?;
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection,
        neo4j_url = %config.neo4j_url,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        llm_configured = config.llm_api_url.is_some() && config.llm_model.is_some(),
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_env(key: &str, value: &str) {
        // SAFETY: every test uses its own variable names, none of which are read elsewhere.
        unsafe { env::set_var(key, value) }
    }

    #[test]
    fn unparsable_number_names_the_variable() {
        set_env("IDP_CONFIG_TEST_BAD_NUMBER", "eight hundred");
        let error = parse_or::<usize>("IDP_CONFIG_TEST_BAD_NUMBER", 800).expect_err("invalid");
        assert!(
            matches!(error, ConfigError::InvalidValue(ref key) if key == "IDP_CONFIG_TEST_BAD_NUMBER")
        );
    }

    #[test]
    fn blank_and_unset_values_fall_back_to_defaults() {
        set_env("IDP_CONFIG_TEST_BLANK", "   ");
        assert_eq!(parse_or("IDP_CONFIG_TEST_BLANK", 120usize).expect("default"), 120);
        assert_eq!(parse_or("IDP_CONFIG_TEST_UNSET", 3u32).expect("default"), 3);
        assert_eq!(load_env_or("IDP_CONFIG_TEST_BLANK", "fallback"), "fallback");
    }

    #[test]
    fn booleans_accept_common_spellings() {
        set_env("IDP_CONFIG_TEST_FLAG_ON", "Yes");
        set_env("IDP_CONFIG_TEST_FLAG_OFF", "0");
        set_env("IDP_CONFIG_TEST_FLAG_BAD", "maybe");
        assert!(parse_bool("IDP_CONFIG_TEST_FLAG_ON", false).expect("flag"));
        assert!(!parse_bool("IDP_CONFIG_TEST_FLAG_OFF", true).expect("flag"));
        assert!(matches!(
            parse_bool("IDP_CONFIG_TEST_FLAG_BAD", true),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
