use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

/// Outbound mail relay. With no `api_url` messages are only logged.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

/// Avatar storage. S3/MinIO when `minio` is set, local disk otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub minio: Option<MinioConfig>,
    pub avatar_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub public_url: Option<String>,
    pub jwt: JwtConfig,
    pub reset_ttl_minutes: i64,
    pub mail: MailConfig,
    pub storage: StorageConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "tourbook"),
            audience: env_or("JWT_AUDIENCE", "tourbook-users"),
            ttl_days: env_i64("JWT_TTL_DAYS", 30),
        };
        let mail = MailConfig {
            api_url: std::env::var("MAIL_API_URL").ok(),
            api_key: std::env::var("MAIL_API_KEY").ok(),
            from: env_or("MAIL_FROM", "no-reply@tourbook.local"),
        };
        let minio = match std::env::var("MINIO_ENDPOINT") {
            Ok(endpoint) => Some(MinioConfig {
                endpoint,
                bucket: std::env::var("MINIO_BUCKET")?,
                access_key: std::env::var("MINIO_ACCESS_KEY")?,
                secret_key: std::env::var("MINIO_SECRET_KEY")?,
            }),
            Err(_) => None,
        };
        let storage = StorageConfig {
            minio,
            avatar_dir: env_or("AVATAR_DIR", "public/img/users"),
        };
        let config = Self {
            database_url,
            public_url: std::env::var("PUBLIC_URL").ok(),
            jwt,
            reset_ttl_minutes: env_i64("RESET_TOKEN_TTL_MINUTES", 10),
            mail,
            storage,
        };
        config.check()?;
        Ok(config)
    }

    /// Real mail needs a fixed link base; request headers are client-controlled.
    fn check(&self) -> anyhow::Result<()> {
        if self.mail.api_url.is_some() && self.public_url.is_none() {
            anyhow::bail!("PUBLIC_URL must be set when MAIL_API_URL is configured");
        }
        Ok(())
    }
}
