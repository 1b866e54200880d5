use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub identity: IdentityConfig,
    pub otp: OtpConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

/// Signing settings for anonymous identities.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub secret: String,
    pub token_ttl: Duration,
    pub issuer: String,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub length: usize,
    pub ttl: Duration,
    pub max_attempts: u32,
    /// Code handed out instead of a random one. Development builds use a
    /// well-known value because no delivery channel exists.
    pub fixed_code: Option<String>,
    /// Write issued codes to the log.
    pub log_codes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL documents and Redis device storage.
    Hosted,
    /// Process-local maps; nothing survives a restart.
    Memory,
}

impl StorageBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hosted" | "postgres" => Some(Self::Hosted),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// In-memory device sessions untouched for this long are dropped and
    /// restored from device storage on the next request.
    pub idle_ttl: Duration,
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let is_development = environment == "development";

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                environment,
            },
            database: DatabaseConfig {
                host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("DB_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(5432),
                user: env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
                password: env::var("DB_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
                database: env::var("DB_NAME").unwrap_or_else(|_| "wirebazaar".to_string()),
                ssl_mode: env::var("DB_SSL_MODE").unwrap_or_else(|_| "disable".to_string()),
                max_connections: env::var("DB_MAX_CONNS")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(10),
            },
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("REDIS_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(6379),
                password: env::var("REDIS_PASSWORD").ok(),
                db: env::var("REDIS_DB")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(0),
            },
            identity: IdentityConfig {
                secret: env::var("IDENTITY_SECRET")
                    .unwrap_or_else(|_| "wirebazaar-identity-secret-change-me".to_string()),
                token_ttl: Duration::from_secs(
                    env::var("IDENTITY_TOKEN_TTL")
                        .ok()
                        .and_then(|p| p.parse().ok())
                        .unwrap_or(30 * 24 * 60 * 60), // 30 days
                ),
                issuer: env::var("IDENTITY_ISSUER").unwrap_or_else(|_| "wirebazaar".to_string()),
            },
            otp: OtpConfig {
                length: env::var("OTP_LENGTH")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(6),
                ttl: Duration::from_secs(
                    env::var("OTP_TTL")
                        .ok()
                        .and_then(|p| p.parse().ok())
                        .unwrap_or(5 * 60), // 5 minutes
                ),
                max_attempts: env::var("OTP_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(4),
                fixed_code: env::var("OTP_FIXED_CODE")
                    .ok()
                    .filter(|c| !c.trim().is_empty())
                    .or_else(|| is_development.then(|| "123456".to_string())),
                log_codes: is_development,
            },
            storage: StorageConfig {
                backend: env::var("STORAGE_BACKEND")
                    .ok()
                    .and_then(|b| StorageBackend::parse(&b))
                    .unwrap_or(StorageBackend::Hosted),
            },
            session: SessionConfig {
                idle_ttl: Duration::from_secs(
                    env::var("SESSION_IDLE_TTL")
                        .ok()
                        .and_then(|t| t.parse().ok())
                        .unwrap_or(30 * 60), // 30 minutes
                ),
            },
        }
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.database.user,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database,
            self.database.ssl_mode
        )
    }

    pub fn redis_url(&self) -> String {
        match &self.redis.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis.host, self.redis.port, self.redis.db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis.host, self.redis.port, self.redis.db
            ),
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            length: 6,
            ttl: Duration::from_secs(5 * 60),
            max_attempts: 4,
            fixed_code: Some("123456".to_string()),
            log_codes: false,
        }
    }
}
