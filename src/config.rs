use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODELS: &str = "all-minilm,nomic-embed-text";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Secret credential whose value never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw credential.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw credential for use in an outgoing request header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Runtime configuration for the PDF question-answering server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP listener binds to.
    pub server_host: String,
    /// Optional fixed HTTP port; when absent the first free port in 8000-8099 is used.
    pub server_port: Option<u16>,
    /// Directory receiving one `<document_id>.pdf` file per upload.
    pub upload_dir: PathBuf,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
    /// Backend serving embedding models.
    pub embedding_provider: EmbeddingProvider,
    /// Ordered embedding model attempt list; the first loadable entry wins.
    pub embedding_models: Vec<String>,
    /// Base URL of the embedding provider.
    pub embedding_url: String,
    /// Credential for hosted embedding providers.
    pub embedding_api_key: Option<ApiKey>,
    /// Behaviour when no embedding model in the attempt list can be loaded.
    pub embedding_fallback: EmbeddingFallback,
    /// Vector width of the local hashing encoder used in degraded mode.
    pub embedding_dimension: usize,
    /// Backend answering prompts.
    pub generation_provider: GenerationProvider,
    /// Completion model identifier passed to the generation provider.
    pub generation_model: String,
    /// Base URL of the generation provider.
    pub generation_url: String,
    /// Credential for the generation provider; required for OpenAI.
    pub generation_api_key: Option<ApiKey>,
    /// Upper bound on attempts for one generation call.
    pub generation_max_attempts: u32,
    /// Initial backoff between generation attempts, doubled after each failure.
    pub generation_backoff_ms: u64,
    /// Token budget per chunk.
    pub text_splitter_chunk_size: usize,
    /// Tokens shared between neighbouring chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks handed to the generation step.
    pub retrieval_top_k: usize,
    /// Deadline for index build plus answer generation.
    pub ask_timeout_secs: u64,
    /// Reuse built indexes across questions for unchanged documents.
    pub index_cache: bool,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
}

/// Supported answer-generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationProvider {
    /// Hosted OpenAI-compatible chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Degraded-mode policy applied when every configured embedding model fails to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingFallback {
    /// Substitute the built-in hashing encoder and record the substitution.
    Hashing,
    /// Run without embeddings; questions fail with a capability-unavailable error.
    None,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let embedding_provider: EmbeddingProvider =
            parse_or(&optional, "EMBEDDING_PROVIDER", EmbeddingProvider::Ollama)?;
        let generation_provider: GenerationProvider =
            parse_or(&optional, "GENERATION_PROVIDER", GenerationProvider::OpenAI)?;

        let embedding_models: Vec<String> = optional("EMBEDDING_MODELS")
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODELS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(str::to_string)
            .collect();
        if embedding_models.is_empty() {
            return Err(ConfigError::InvalidValue("EMBEDDING_MODELS".into()));
        }

        let generation_api_key = optional("GENERATION_API_KEY").map(ApiKey::new);
        if generation_provider == GenerationProvider::OpenAI && generation_api_key.is_none() {
            return Err(ConfigError::MissingVariable("GENERATION_API_KEY".into()));
        }
        let embedding_api_key = optional("EMBEDDING_API_KEY")
            .map(ApiKey::new)
            .or_else(|| generation_api_key.clone());

        let config = Self {
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            upload_dir: PathBuf::from(
                optional("UPLOAD_DIR").unwrap_or_else(|| "uploaded_pdfs".to_string()),
            ),
            max_upload_bytes: parse_or(&optional, "MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            embedding_provider,
            embedding_models,
            embedding_url: optional("EMBEDDING_URL")
                .unwrap_or_else(|| embedding_provider.default_url().to_string()),
            embedding_api_key,
            embedding_fallback: parse_or(
                &optional,
                "EMBEDDING_FALLBACK",
                EmbeddingFallback::Hashing,
            )?,
            embedding_dimension: parse_or(&optional, "EMBEDDING_DIMENSION", 384)?,
            generation_provider,
            generation_model: optional("GENERATION_MODEL")
                .unwrap_or_else(|| generation_provider.default_model().to_string()),
            generation_url: optional("GENERATION_URL")
                .unwrap_or_else(|| generation_provider.default_url().to_string()),
            generation_api_key,
            generation_max_attempts: parse_or(&optional, "GENERATION_MAX_ATTEMPTS", 3)?,
            generation_backoff_ms: parse_or(&optional, "GENERATION_BACKOFF_MS", 250)?,
            text_splitter_chunk_size: parse_or(&optional, "TEXT_SPLITTER_CHUNK_SIZE", 512)?,
            text_splitter_chunk_overlap: parse_or(&optional, "TEXT_SPLITTER_CHUNK_OVERLAP", 64)?,
            retrieval_top_k: parse_or(&optional, "RETRIEVAL_TOP_K", 3)?,
            ask_timeout_secs: parse_or(&optional, "ASK_TIMEOUT_SECS", 120)?,
            index_cache: parse_flag(&optional, "INDEX_CACHE")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("MAX_UPLOAD_BYTES", self.max_upload_bytes),
            ("EMBEDDING_DIMENSION", self.embedding_dimension),
            ("TEXT_SPLITTER_CHUNK_SIZE", self.text_splitter_chunk_size),
            ("RETRIEVAL_TOP_K", self.retrieval_top_k),
            ("GENERATION_MAX_ATTEMPTS", self.generation_max_attempts as usize),
            ("ASK_TIMEOUT_SECS", self.ask_timeout_secs as usize),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue((*key).to_string()));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T, F>(optional: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_flag<F>(optional: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(key).map(|value| value.trim().to_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
    }
}

impl EmbeddingProvider {
    fn default_url(self) -> &'static str {
        match self {
            Self::Ollama => DEFAULT_OLLAMA_URL,
            Self::OpenAI => DEFAULT_OPENAI_URL,
        }
    }
}

impl GenerationProvider {
    fn default_url(self) -> &'static str {
        match self {
            Self::OpenAI => DEFAULT_OPENAI_URL,
            Self::Ollama => DEFAULT_OLLAMA_URL,
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Ollama => "llama3.2",
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl FromStr for EmbeddingFallback {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
///
/// Fails when a required secret is absent so the process never serves with a broken
/// generation capability. Call after `dotenvy::dotenv` and tracing setup so `.env` values are
/// visible here and the summary event is recorded.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    let config = Config::from_env()?;
    log_loaded(&config);
    Ok(CONFIG.get_or_init(|| config))
}

fn log_loaded(config: &Config) {
    tracing::info!(
        server_host = %config.server_host,
        server_port = ?config.server_port,
        upload_dir = %config.upload_dir.display(),
        embedding_provider = ?config.embedding_provider,
        embedding_models = ?config.embedding_models,
        generation_provider = ?config.generation_provider,
        generation_model = %config.generation_model,
        "Loaded configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_present() {
        let config = Config::from_lookup(lookup(&[("GENERATION_API_KEY", "sk-test")]))
            .expect("config loads");

        assert_eq!(config.server_host, "0.0.0.0");
        assert_eq!(config.server_port, None);
        assert_eq!(config.upload_dir, PathBuf::from("uploaded_pdfs"));
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(config.embedding_models, vec!["all-minilm", "nomic-embed-text"]);
        assert_eq!(config.embedding_fallback, EmbeddingFallback::Hashing);
        assert_eq!(config.generation_provider, GenerationProvider::OpenAI);
        assert_eq!(config.generation_url, DEFAULT_OPENAI_URL);
        assert_eq!(config.text_splitter_chunk_size, 512);
        assert_eq!(config.text_splitter_chunk_overlap, 64);
        assert_eq!(config.retrieval_top_k, 3);
        assert!(!config.index_cache);
        assert_eq!(config.embedding_api_key.as_ref().map(ApiKey::expose), Some("sk-test"));
    }

    #[test]
    fn missing_openai_secret_fails_fast() {
        let error = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(error, ConfigError::MissingVariable("GENERATION_API_KEY".into()));
    }

    #[test]
    fn ollama_generation_runs_without_secret() {
        let config = Config::from_lookup(lookup(&[
            ("GENERATION_PROVIDER", "ollama"),
            ("EMBEDDING_MODELS", " mxbai-embed-large , ,all-minilm"),
            ("INDEX_CACHE", "true"),
        ]))
        .expect("config loads");

        assert_eq!(config.generation_provider, GenerationProvider::Ollama);
        assert_eq!(config.generation_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.generation_model, "llama3.2");
        assert!(config.generation_api_key.is_none());
        assert_eq!(config.embedding_models, vec!["mxbai-embed-large", "all-minilm"]);
        assert!(config.index_cache);
    }

    #[test]
    fn rejects_unparseable_and_inconsistent_values() {
        let bad_port = Config::from_lookup(lookup(&[
            ("GENERATION_API_KEY", "k"),
            ("SERVER_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert_eq!(bad_port, ConfigError::InvalidValue("SERVER_PORT".into()));

        let overlap = Config::from_lookup(lookup(&[
            ("GENERATION_API_KEY", "k"),
            ("TEXT_SPLITTER_CHUNK_SIZE", "32"),
            ("TEXT_SPLITTER_CHUNK_OVERLAP", "32"),
        ]))
        .unwrap_err();
        assert_eq!(overlap, ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_OVERLAP".into()));

        let top_k = Config::from_lookup(lookup(&[
            ("GENERATION_API_KEY", "k"),
            ("RETRIEVAL_TOP_K", "0"),
        ]))
        .unwrap_err();
        assert_eq!(top_k, ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));

        let fallback = Config::from_lookup(lookup(&[
            ("GENERATION_API_KEY", "k"),
            ("EMBEDDING_FALLBACK", "magic"),
        ]))
        .unwrap_err();
        assert_eq!(fallback, ConfigError::InvalidValue("EMBEDDING_FALLBACK".into()));
    }

    #[test]
    fn debug_output_never_contains_secret() {
        let config = Config::from_lookup(lookup(&[("GENERATION_API_KEY", "sk-very-secret")]))
            .expect("config loads");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn loaded_configuration_is_logged_without_secret() {
        let config = Config::from_lookup(lookup(&[("GENERATION_API_KEY", "sk-very-secret")]))
            .expect("config loads");
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || log_loaded(&config));

        let output = String::from_utf8(logs.0.lock().expect("log buffer").clone()).expect("utf8");
        assert!(output.contains("Loaded configuration"), "got {output:?}");
        assert!(output.contains("gpt-4o-mini"));
        assert!(!output.contains("sk-very-secret"));
    }
}
