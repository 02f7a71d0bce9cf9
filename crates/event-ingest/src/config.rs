// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use tokio::sync::Semaphore;

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_ENDPOINT_PATH: &str = "/api/v1/events";
const DEFAULT_MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024; // 10MB in Bytes
const DEFAULT_COLLECTOR_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// path the ingest endpoint is mounted on, always starts with `/`
    pub endpoint_path: String,
    pub max_request_content_length: usize,
    /// Maximum number of events accepted in one batch request. `None` means no limit
    /// besides `max_request_content_length`.
    pub max_batch_size: Option<usize>,
    /// Maximum number of events of one batch forwarded concurrently. 0 means unbounded.
    pub max_concurrent_forwards: usize,
    pub collector_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
            max_batch_size: None,
            max_concurrent_forwards: 0,
            collector_buffer_size: DEFAULT_COLLECTOR_BUFFER_SIZE,
        }
    }
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let defaults = Config::default();

        let host = parse_env("EVENT_INGEST_HOST")?.unwrap_or(defaults.host);
        let port = parse_env("EVENT_INGEST_PORT")?.unwrap_or(defaults.port);

        let endpoint_path =
            env::var("EVENT_INGEST_ENDPOINT_PATH").unwrap_or(defaults.endpoint_path);
        if !endpoint_path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "EVENT_INGEST_ENDPOINT_PATH must start with '/', got {endpoint_path:?}"
            )
            .into());
        }

        let max_request_content_length = parse_env("EVENT_INGEST_MAX_REQUEST_CONTENT_LENGTH")?
            .unwrap_or(defaults.max_request_content_length);
        let max_batch_size = parse_env("EVENT_INGEST_MAX_BATCH_SIZE")?;
        let max_concurrent_forwards = parse_permits_env("EVENT_INGEST_MAX_CONCURRENT_FORWARDS")?
            .unwrap_or(defaults.max_concurrent_forwards);
        let collector_buffer_size = parse_permits_env("EVENT_INGEST_COLLECTOR_BUFFER_SIZE")?
            .unwrap_or(defaults.collector_buffer_size);

        Ok(Config {
            host,
            port,
            endpoint_path,
            max_request_content_length,
            max_batch_size,
            max_concurrent_forwards,
            collector_buffer_size,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Reads and parses an environment variable. Unset or empty variables yield `None`,
/// unparseable values are an error rather than a silent fallback.
fn parse_env<T>(name: &str) -> Result<Option<T>, anyhow::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("Invalid value {value:?} for {name}: {err}")),
        _ => Ok(None),
    }
}

/// Like [`parse_env`] for values backing a tokio semaphore or channel, which cannot
/// hold more than [`Semaphore::MAX_PERMITS`].
fn parse_permits_env(name: &str) -> Result<Option<usize>, anyhow::Error> {
    match parse_env::<usize>(name)? {
        Some(value) if value > Semaphore::MAX_PERMITS => Err(anyhow::anyhow!(
            "Invalid value \"{value}\" for {name}: must be at most {}",
            Semaphore::MAX_PERMITS
        )),
        value => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use duplicate::duplicate_item;
    use serial_test::serial;
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    use crate::config;

    const ALL_VARS: [&str; 7] = [
        "EVENT_INGEST_HOST",
        "EVENT_INGEST_PORT",
        "EVENT_INGEST_ENDPOINT_PATH",
        "EVENT_INGEST_MAX_REQUEST_CONTENT_LENGTH",
        "EVENT_INGEST_MAX_BATCH_SIZE",
        "EVENT_INGEST_MAX_CONCURRENT_FORWARDS",
        "EVENT_INGEST_COLLECTOR_BUFFER_SIZE",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = config::Config::new().unwrap();
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, 8888);
        assert_eq!(config.endpoint_path, "/api/v1/events");
        assert_eq!(config.max_request_content_length, 10 * 1024 * 1024);
        assert_eq!(config.max_batch_size, None);
        assert_eq!(config.max_concurrent_forwards, 0);
        assert_eq!(config.collector_buffer_size, 1024);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8888");
    }

    #[test]
    #[serial]
    fn test_custom_values() {
        clear_env();
        env::set_var("EVENT_INGEST_HOST", "0.0.0.0");
        env::set_var("EVENT_INGEST_PORT", "18888");
        env::set_var("EVENT_INGEST_ENDPOINT_PATH", "/ingest");
        env::set_var("EVENT_INGEST_MAX_BATCH_SIZE", "500");
        env::set_var("EVENT_INGEST_MAX_CONCURRENT_FORWARDS", "16");
        let config = config::Config::new().unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:18888");
        assert_eq!(config.endpoint_path, "/ingest");
        assert_eq!(config.max_batch_size, Some(500));
        assert_eq!(config.max_concurrent_forwards, 16);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_empty_value_uses_default() {
        clear_env();
        env::set_var("EVENT_INGEST_PORT", "  ");
        let config = config::Config::new().unwrap();
        assert_eq!(config.port, 8888);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_endpoint_path_must_be_absolute() {
        clear_env();
        env::set_var("EVENT_INGEST_ENDPOINT_PATH", "events");
        let config = config::Config::new();
        assert!(config.is_err());
        assert_eq!(
            config.unwrap_err().to_string(),
            "EVENT_INGEST_ENDPOINT_PATH must start with '/', got \"events\""
        );
        clear_env();
    }

    #[duplicate_item(
        test_name                               var                                         value;
        [test_invalid_host]                     ["EVENT_INGEST_HOST"]                       ["localhost:80"];
        [test_invalid_port]                     ["EVENT_INGEST_PORT"]                       ["99999"];
        [test_invalid_max_content_length]       ["EVENT_INGEST_MAX_REQUEST_CONTENT_LENGTH"] ["-1"];
        [test_invalid_max_batch_size]           ["EVENT_INGEST_MAX_BATCH_SIZE"]             ["many"];
        [test_invalid_max_concurrent_forwards]  ["EVENT_INGEST_MAX_CONCURRENT_FORWARDS"]    ["1.5"];
        [test_too_many_concurrent_forwards]     ["EVENT_INGEST_MAX_CONCURRENT_FORWARDS"]    ["18446744073709551615"];
        [test_collector_buffer_too_large]       ["EVENT_INGEST_COLLECTOR_BUFFER_SIZE"]      ["18446744073709551615"];
    )]
    #[test]
    #[serial]
    fn test_name() {
        clear_env();
        env::set_var(var, value);
        let config = config::Config::new();
        assert!(config.is_err());
        assert!(config
            .unwrap_err()
            .to_string()
            .starts_with(&format!("Invalid value {:?} for {}", value, var)));
        clear_env();
    }
}
