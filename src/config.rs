use crate::services::upload_service::UploadLimits;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub storage: StorageConfig,
    pub allowed_origin: String,
    pub limits: UploadLimits,
}

/// Which object-store backend to construct at startup.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Local disk; public URLs resolve through this service's `/objects/`
    /// route beneath `public_base_url`.
    Fs {
        storage_dir: String,
        public_base_url: String,
    },
    /// AWS S3 (or an S3-compatible endpoint such as MinIO).
    S3 {
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        force_path_style: bool,
    },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File-storage web service")]
pub struct Args {
    /// Host to bind to (overrides DRIVE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DRIVE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides DRIVE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object storage backend, `fs` or `s3` (overrides DRIVE_STORE_STORAGE_BACKEND)
    #[arg(long)]
    pub storage_backend: Option<String>,

    /// Directory where objects are stored under the fs backend
    /// (overrides DRIVE_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("DRIVE_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed("DRIVE_STORE_PORT", 5000u16)?;
        let env_db = env::var("DRIVE_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/drive.db".into());
        let env_backend = env::var("DRIVE_STORE_STORAGE_BACKEND").unwrap_or_else(|_| "fs".into());
        let allowed_origin = env::var("DRIVE_STORE_ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".into());

        let limits = UploadLimits {
            max_batch_files: env_parsed("DRIVE_STORE_MAX_BATCH_FILES", 10usize)?,
            batch_file_bytes: env_parsed("DRIVE_STORE_BATCH_FILE_LIMIT_BYTES", 5 * 1024 * 1024)?,
            single_file_bytes: env_parsed("DRIVE_STORE_SINGLE_FILE_LIMIT_BYTES", 50 * 1024 * 1024)?,
        };

        // --- Merge ---
        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);

        let backend = args.storage_backend.unwrap_or(env_backend);
        let storage = match backend.as_str() {
            "fs" => {
                let storage_dir = args
                    .storage_dir
                    .or_else(|| env::var("DRIVE_STORE_STORAGE_DIR").ok())
                    .unwrap_or_else(|| "./data/objects".into());
                let public_base_url = env::var("DRIVE_STORE_PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| format!("http://localhost:{}", port));
                StorageConfig::Fs {
                    storage_dir,
                    public_base_url,
                }
            }
            "s3" => StorageConfig::S3 {
                bucket: env::var("DRIVE_STORE_S3_BUCKET")
                    .context("DRIVE_STORE_S3_BUCKET is required for the s3 backend")?,
                region: env::var("DRIVE_STORE_S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
                endpoint_url: env::var("DRIVE_STORE_S3_ENDPOINT_URL").ok(),
                force_path_style: env_parsed("DRIVE_STORE_S3_FORCE_PATH_STYLE", false)?,
            },
            other => bail!("unknown storage backend `{}` (expected `fs` or `s3`)", other),
        };

        let cfg = Self {
            host,
            port,
            database_url: args.database_url.unwrap_or(env_db),
            storage,
            allowed_origin,
            limits,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read an env var and parse it, falling back to `default` when unset.
fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("parsing {} value `{}`: {}", key, value, err)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
