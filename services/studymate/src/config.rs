use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// StudyMate configuration loaded from environment variables.
pub struct StudyMateConfig {
    /// PostgreSQL connection URL. Env var: `DATABASE_URL`.
    pub database_url: String,
    /// MongoDB connection string for the mirror store. Env var: `MONGODB_URI`.
    pub mongodb_uri: String,
    /// Mirror database name (default `studymate_db`). Env var: `MONGODB_DATABASE`.
    pub mongodb_database: String,
    /// HMAC secret for signing access and refresh tokens. Env var: `JWT_SECRET`.
    pub jwt_secret: String,
    /// Cloudinary credentials. The account must sign requests with SHA-256.
    pub cloudinary: CloudinaryConfig,
    /// TCP port to listen on (default 8000). Env var: `STUDYMATE_PORT`.
    pub port: u16,
    /// Root directory of legacy local uploads (default `media`). Env var: `MEDIA_ROOT`.
    pub media_root: PathBuf,
    /// Period of the sync outbox drainer (default 30s, min 1s). Env var: `SYNC_DRAIN_INTERVAL_SECS`.
    pub sync_drain_interval: Duration,
}

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl StudyMateConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            mongodb_uri: std::env::var("MONGODB_URI").expect("MONGODB_URI"),
            mongodb_database: std::env::var("MONGODB_DATABASE")
                .unwrap_or_else(|_| "studymate_db".to_owned()),
            jwt_secret: std::env::var("JWT_SECRET").expect("JWT_SECRET"),
            cloudinary: CloudinaryConfig {
                cloud_name: std::env::var("CLOUDINARY_CLOUD_NAME").expect("CLOUDINARY_CLOUD_NAME"),
                api_key: std::env::var("CLOUDINARY_API_KEY").expect("CLOUDINARY_API_KEY"),
                api_secret: std::env::var("CLOUDINARY_API_SECRET").expect("CLOUDINARY_API_SECRET"),
            },
            port: std::env::var("STUDYMATE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            media_root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("media")),
            sync_drain_interval: drain_interval(
                std::env::var("SYNC_DRAIN_INTERVAL_SECS").ok().as_deref(),
            ),
        }
    }
}

/// Seconds between outbox drains: 30 when unset or unparsable, never below one.
fn drain_interval(raw: Option<&str>) -> Duration {
    let secs = raw.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(30);
    Duration::from_secs(secs.max(1))
}

impl fmt::Debug for StudyMateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudyMateConfig")
            .field("database_url", &"***")
            .field("mongodb_uri", &"***")
            .field("mongodb_database", &self.mongodb_database)
            .field("jwt_secret", &"***")
            .field("cloudinary", &self.cloudinary)
            .field("port", &self.port)
            .field("media_root", &self.media_root)
            .field("sync_drain_interval", &self.sync_drain_interval)
            .finish()
    }
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}
