//! Process configuration, read once at startup from `PARLEY_*` variables.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEFAULT_PORT: u16 = 5001;
const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PARLEY_DB_PATH is not set")]
    MissingDbPath,

    #[error("PARLEY_JWT_SECRET is unset or still a placeholder")]
    InsecureJwtSecret,

    #[error("PARLEY_ENCRYPTION_KEY must be set in production")]
    MissingEncryptionKey,

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Cloudinary needs PARLEY_CLOUDINARY_CLOUD_NAME, _API_KEY and _API_SECRET together")]
    PartialCloudinary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_ascii_lowercase().as_str() {
            "" | "dev" | "development" => Ok(Profile::Development),
            "prod" | "production" => Ok(Profile::Production),
            _ => Err(ConfigError::Invalid {
                name: "PARLEY_ENV",
                value: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Development => f.write_str("development"),
            Profile::Production => f.write_str("production"),
        }
    }
}

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Clone)]
pub struct Config {
    pub profile: Profile,
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub encryption_key: Option<String>,
    pub enable_sockets: bool,
    pub client_url: String,
    pub public_url: String,
    pub upload_dir: PathBuf,
    pub cloudinary: Option<CloudinaryConfig>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("profile", &self.profile)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<set>"))
            .field("enable_sockets", &self.enable_sockets)
            .field("client_url", &self.client_url)
            .field("public_url", &self.public_url)
            .field("upload_dir", &self.upload_dir)
            .field("cloudinary", &self.cloudinary.is_some())
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let profile = Profile::parse(var("PARLEY_ENV").unwrap_or_default().trim())?;

        let db_path: PathBuf = var("PARLEY_DB_PATH")
            .map(|raw| strip_quotes(&raw).to_string())
            .filter(|path| !path.is_empty())
            .ok_or(ConfigError::MissingDbPath)?
            .into();

        let jwt_secret = var("PARLEY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::InsecureJwtSecret);
        }

        let encryption_key = var("PARLEY_ENCRYPTION_KEY");
        if encryption_key.is_none() && profile == Profile::Production {
            return Err(ConfigError::MissingEncryptionKey);
        }

        let port = match var("PARLEY_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PARLEY_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        // The gateway is opt-in in every profile
        let enable_sockets = match var("PARLEY_ENABLE_SOCKETS").as_deref().map(str::trim) {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") | None => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "PARLEY_ENABLE_SOCKETS",
                    value: other.to_string(),
                });
            }
        };

        let cloudinary = match (
            var("PARLEY_CLOUDINARY_CLOUD_NAME"),
            var("PARLEY_CLOUDINARY_API_KEY"),
            var("PARLEY_CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            (None, None, None) => None,
            _ => return Err(ConfigError::PartialCloudinary),
        };

        Ok(Config {
            profile,
            host: var("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path,
            jwt_secret,
            encryption_key,
            enable_sockets,
            client_url: var("PARLEY_CLIENT_URL").unwrap_or_else(|| DEFAULT_CLIENT_URL.into()),
            public_url: var("PARLEY_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{}", port)),
            upload_dir: var("PARLEY_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            cloudinary,
        })
    }
}

/// Trim whitespace and one pair of wrapping quotes left over from `.env` files.
/// Applied to the database path only; secrets are taken verbatim.
pub fn strip_quotes(raw: &str) -> &str {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    trimmed
}
