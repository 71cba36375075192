use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Base URL for building trial-report URLs: `<base_url>/<id>`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://scge.mcw.edu/platform/data/report/clinicalTrials".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizeConfig {
    /// Documents whose cleaned text is shorter than this are dropped.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
        }
    }
}

fn default_min_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size, in approximate tokens.
    #[serde(default = "default_chunk_size_tokens")]
    pub chunk_size_tokens: usize,
    /// A buffer below this many characters keeps accumulating instead of
    /// flushing, unless it is the only content.
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    /// Chunks shorter than this after trimming are never embedded.
    #[serde(default = "default_min_embed_chars")]
    pub min_embed_chars: usize,
    /// Hard cap on chunks per document; excess tail content is dropped.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    /// Keep paragraph/line separators inside chunks for readability.
    #[serde(default = "default_keep_separators")]
    pub keep_separators: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size_tokens(),
            min_chunk_chars: default_min_chunk_chars(),
            min_embed_chars: default_min_embed_chars(),
            max_chunks: default_max_chunks(),
            keep_separators: default_keep_separators(),
        }
    }
}

fn default_chunk_size_tokens() -> usize {
    800
}
fn default_min_chunk_chars() -> usize {
    200
}
fn default_min_embed_chars() -> usize {
    50
}
fn default_max_chunks() -> usize {
    10_000
}
fn default_keep_separators() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Embedding backend name, resolved once at startup into a concrete
    /// strategy. Currently only `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size_tokens == 0 {
        anyhow::bail!("chunking.chunk_size_tokens must be > 0");
    }
    if config.chunking.max_chunks == 0 {
        anyhow::bail!("chunking.max_chunks must be > 0");
    }
    if config.chunking.min_embed_chars > config.chunking.min_chunk_chars {
        anyhow::bail!("chunking.min_embed_chars must not exceed chunking.min_chunk_chars");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "openai" => {}
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be openai.", other),
    }

    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("fetch.timeout_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let f = write_config("[db]\npath = \"/tmp/trials.sqlite\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.chunk_size_tokens, 800);
        assert_eq!(cfg.chunking.min_chunk_chars, 200);
        assert_eq!(cfg.chunking.min_embed_chars, 50);
        assert_eq!(cfg.chunking.max_chunks, 10_000);
        assert!(cfg.chunking.keep_separators);
        assert_eq!(cfg.normalize.min_chars, 50);
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.fetch.timeout_secs, 30);
    }

    #[test]
    fn rejects_unknown_provider() {
        let f = write_config(
            "[db]\npath = \"/tmp/trials.sqlite\"\n[embedding]\nprovider = \"quantum\"\n",
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn rejects_zero_chunk_target() {
        let f = write_config(
            "[db]\npath = \"/tmp/trials.sqlite\"\n[chunking]\nchunk_size_tokens = 0\n",
        );
        assert!(load_config(f.path()).is_err());
    }
}
