use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub database: DatabaseConfig,
    pub reservation: ReservationConfig,
    pub seeding: SeedingConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

// Где живут места
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_seconds: u64,
}

// Настройки протоколов бронирования
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    pub lock_timeout_ms: u64,
    pub max_create_retries: u32,
}

impl ReservationConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            max_create_retries: 3,
        }
    }
}

// Настройки засева
#[derive(Debug, Clone, Deserialize)]
pub struct SeedingConfig {
    pub batch_size: u32,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self { batch_size: 10_000 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника ключей (в тестах - из HashMap).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STORE_BACKEND",
                    value: other.to_string(),
                    reason: "expected postgres or memory".to_string(),
                })
            }
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected pretty or json".to_string(),
                })
            }
        };

        // без DATABASE_URL можно работать только на хранилище в памяти
        let database_url = match (lookup("DATABASE_URL"), backend) {
            (Some(url), _) => url,
            (None, StoreBackend::Memory) => String::new(),
            (None, StoreBackend::Postgres) => return Err(ConfigError::Missing("DATABASE_URL")),
        };

        let config = Config {
            app: AppConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 3000)?,
                environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
                rust_log: lookup("RUST_LOG")
                    .unwrap_or_else(|| "seat_reservation=debug,tower_http=debug".to_string()),
                log_format,
            },
            store: StoreConfig { backend },
            database: DatabaseConfig {
                url: database_url,
                pool_size: parse_or(&lookup, "DB_POOL_SIZE", 20)?,
                acquire_timeout_seconds: parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECONDS", 5)?,
            },
            reservation: ReservationConfig {
                lock_timeout_ms: parse_or(&lookup, "LOCK_TIMEOUT_MS", 5000)?,
                max_create_retries: parse_or(&lookup, "MAX_CREATE_RETRIES", 3)?,
            },
            seeding: SeedingConfig {
                batch_size: parse_or(&lookup, "SEED_BATCH_SIZE", 10_000)?,
            },
        };

        if config.reservation.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "LOCK_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "lock wait must be bounded by a positive timeout".to_string(),
            });
        }

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/multiplex")]).unwrap();
        assert_eq!(config.app.port, 3000);
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.app.log_format, LogFormat::Pretty);
        assert_eq!(config.reservation.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.reservation.max_create_retries, 3);
        assert_eq!(config.seeding.batch_size, 10_000);
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        assert!(matches!(config_from(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn memory_backend_runs_without_database() {
        let config = config_from(&[("STORE_BACKEND", "memory"), ("LOG_FORMAT", "json")]).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.app.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_numbers_are_reported_with_variable_name() {
        let err = config_from(&[("STORE_BACKEND", "memory"), ("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().starts_with("PORT has invalid value \"eighty\""));
    }

    #[test]
    fn zero_lock_timeout_is_rejected() {
        let err = config_from(&[("STORE_BACKEND", "memory"), ("LOCK_TIMEOUT_MS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "LOCK_TIMEOUT_MS", .. }));
    }
}
