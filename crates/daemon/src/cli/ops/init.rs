use std::fmt;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use owo_colors::OwoColorize;

use bucketfs_daemon::state::{AppState, StateError};
use bucketfs_daemon::Config;
use object_store::{ObjectStoreConfig, RemoteConfig};

/// Object store backend for CLI selection
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Backend {
    /// Process-local storage, for trying things out
    #[default]
    Memory,
    /// One directory per bucket under --local-path
    Local,
    /// S3 or an S3-compatible endpoint
    S3,
}

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Buckets exposed at the root (repeatable)
    #[arg(long = "bucket", required = true)]
    pub buckets: Vec<String>,

    #[arg(long, value_enum, default_value_t = Backend::Memory)]
    pub backend: Backend,

    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Custom S3 endpoint, e.g. http://localhost:9000
    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long, env = "BUCKETFS_ACCESS_KEY")]
    pub access_key: Option<String>,

    #[arg(long, env = "BUCKETFS_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Root directory for --backend local
    #[arg(long)]
    pub local_path: Option<PathBuf>,

    /// Reject every mutating operation
    #[arg(long)]
    pub readonly: bool,
}

#[derive(Debug)]
pub struct InitOutput {
    pub work_dir: PathBuf,
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
    pub buckets: Vec<String>,
    pub backend: String,
}

impl fmt::Display for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} bucketfs at {}",
            "Initialized".green().bold(),
            self.work_dir.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Config:".dimmed(), self.config_path.display())?;
        writeln!(f, "  {} {}", "Cache:".dimmed(), self.cache_dir.display())?;
        writeln!(f, "  {} {}", "Backend:".dimmed(), self.backend)?;
        write!(f, "  {} {}", "Buckets:".dimmed(), self.buckets.join(", "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    State(#[from] StateError),
    #[error("missing required option: {0}")]
    MissingOption(&'static str),
}

impl Init {
    fn store_config(&self) -> Result<ObjectStoreConfig, InitError> {
        match self.backend {
            Backend::Memory => Ok(ObjectStoreConfig::Memory),
            Backend::Local => {
                let path = self
                    .local_path
                    .clone()
                    .ok_or(InitError::MissingOption("--local-path"))?;
                Ok(ObjectStoreConfig::Local { path })
            }
            Backend::S3 => Ok(ObjectStoreConfig::S3 {
                allow_http: self
                    .endpoint
                    .as_deref()
                    .is_some_and(|endpoint| endpoint.starts_with("http://")),
                endpoint: self.endpoint.clone(),
                access_key: self.access_key.clone(),
                secret_key: self.secret_key.clone(),
            }),
        }
    }
}

impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = InitOutput;

    fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = Config {
            readonly: self.readonly,
            remote: RemoteConfig {
                buckets: self.buckets.clone(),
                region: self.region.clone(),
                store: self.store_config()?,
                ..Default::default()
            },
            ..Default::default()
        };

        let state = AppState::init(ctx.work_dir.clone(), Some(config))?;
        let backend = match &state.config.remote.store {
            ObjectStoreConfig::Memory => "memory".to_string(),
            ObjectStoreConfig::Local { path } => format!("local ({})", path.display()),
            ObjectStoreConfig::S3 { endpoint, .. } => {
                format!("s3 ({})", endpoint.as_deref().unwrap_or("aws"))
            }
        };

        Ok(InitOutput {
            work_dir: state.work_dir,
            config_path: state.config_path,
            cache_dir: state.cache_dir,
            buckets: state.config.remote.buckets,
            backend,
        })
    }
}
