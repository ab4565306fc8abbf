//! Runtime configuration for mamba-chat.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. Defaults reproduce the fixed values the service was
//! tuned for: all GPU layers offloaded, a 2048-token context window, and
//! 1024-token replies.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "mamba-chat", about = "Streaming chat server for a local GGUF model")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Model configuration.
    pub model: ModelConfig,

    /// Generation settings.
    pub generation: GenerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Model-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hub repository the weight file lives in.
    pub repo_id: String,

    /// Weight file name within the repository.
    pub filename: String,

    /// Local weight file path. When set, the hub is never contacted.
    pub local_path: Option<PathBuf>,

    /// Number of GPU layers to offload (-1 = all).
    pub n_gpu_layers: i32,

    /// Context size in tokens.
    pub context_size: u32,

    /// Enable engine diagnostic logging.
    pub verbose: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repo_id: "gabriellarson/Mamba-Codestral-7B-v0.1-GGUF".to_string(),
            filename: "Mamba-Codestral-7B-v0.1-Q4_0.gguf".to_string(),
            local_path: None,
            n_gpu_layers: -1,
            context_size: 2048,
            verbose: true,
        }
    }
}

/// Per-turn generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum tokens generated per reply.
    pub max_tokens: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { max_tokens: 1024 }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
