//! Configuration management for Los Libros Reader

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::locations::DEFAULT_CHUNK_SIZE;
use crate::navigation::NavigationThresholds;
use crate::progress::ResumePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub reader: ReaderConfig,
    pub navigation: NavigationThresholds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    /// Characters per location
    pub chunk_size: usize,
    pub save_interval_ms: u64,
    /// Persistence API base, e.g. `http://localhost:3000`
    pub remote_base_url: Option<String>,
    pub cache_dir: PathBuf,
    pub resume_policy: ResumePolicy,
}

impl ReaderConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./reader.db".to_string(),
            },
            reader: ReaderConfig {
                chunk_size: DEFAULT_CHUNK_SIZE,
                save_interval_ms: 3000,
                remote_base_url: None,
                cache_dir: PathBuf::from("./.reader-cache"),
                resume_policy: ResumePolicy::LocalFirst,
            },
            navigation: NavigationThresholds::default(),
        }
    }
}

/// Parse `name`, falling back to `default` when unset or malformed
fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={}", name, value);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();
        let nav = defaults.navigation;

        let resume_policy = match env::var("READER_RESUME_POLICY") {
            Ok(value) => value.parse().map_err(|e: String| {
                tracing::warn!("{}", e);
                env::VarError::NotPresent
            })?,
            Err(_) => defaults.reader.resume_policy,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: var_or("SERVER_PORT", defaults.server.port),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            reader: ReaderConfig {
                chunk_size: var_or("READER_CHUNK_SIZE", defaults.reader.chunk_size).max(1),
                save_interval_ms: var_or("READER_SAVE_INTERVAL_MS", defaults.reader.save_interval_ms),
                remote_base_url: env::var("READER_REMOTE_URL").ok().filter(|u| !u.is_empty()),
                cache_dir: env::var("READER_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.reader.cache_dir),
                resume_policy,
            },
            navigation: NavigationThresholds {
                swipe_min_distance: var_or("NAV_SWIPE_MIN_DISTANCE", nav.swipe_min_distance),
                wheel_min_delta: var_or("NAV_WHEEL_MIN_DELTA", nav.wheel_min_delta),
                pull_hint_distance: var_or("NAV_PULL_HINT_DISTANCE", nav.pull_hint_distance),
                pull_reload_distance: var_or("NAV_PULL_RELOAD_DISTANCE", nav.pull_reload_distance),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment is process-wide, so everything touching it runs in one test
    #[test]
    fn test_from_env() {
        env::set_var("SERVER_PORT", "8123");
        env::set_var("READER_CHUNK_SIZE", "0");
        env::set_var("READER_SAVE_INTERVAL_MS", "not-a-number");
        env::set_var("READER_RESUME_POLICY", "most_recent");
        env::set_var("NAV_SWIPE_MIN_DISTANCE", "80");

        let config = Config::from_env().unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.reader.chunk_size, 1);
        assert_eq!(config.reader.save_interval(), Duration::from_secs(3));
        assert_eq!(config.reader.resume_policy, ResumePolicy::MostRecent);
        assert_eq!(config.navigation.swipe_min_distance, 80.0);
        assert_eq!(config.navigation.wheel_min_delta, 30.0);

        env::set_var("READER_RESUME_POLICY", "whatever");
        assert!(Config::from_env().is_err());

        for name in [
            "SERVER_PORT",
            "READER_CHUNK_SIZE",
            "READER_SAVE_INTERVAL_MS",
            "READER_RESUME_POLICY",
            "NAV_SWIPE_MIN_DISTANCE",
        ] {
            env::remove_var(name);
        }
    }
}
