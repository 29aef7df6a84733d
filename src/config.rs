use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use thiserror::Error;

use crate::server::{
    ServerConfig, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_CONCURRENT_REQUESTS,
    DEFAULT_REQUEST_TIMEOUT,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub service_name: String,
    pub published_host: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SOAP_SERVICE_NAME is required and must not be empty")]
    MissingServiceName,
    #[error("SOAP_SERVICE_NAME must not contain '/' or whitespace")]
    InvalidServiceName,
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("SOAP_REQUEST_TIMEOUT_SECS must be a positive integer")]
    InvalidTimeout,
    #[error("SOAP_MAX_CONCURRENT_REQUESTS must be a positive integer")]
    InvalidConcurrency,
    #[error("SOAP_MAX_BODY_BYTES must be a positive integer")]
    InvalidBodyLimit,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let service_name = value("SOAP_SERVICE_NAME").ok_or(ConfigError::MissingServiceName)?;
        if service_name
            .chars()
            .any(|c| c == '/' || c.is_whitespace())
        {
            return Err(ConfigError::InvalidServiceName);
        }

        let published_host = value("SOAP_PUBLISHED_HOST").unwrap_or_else(detect_published_host);
        let bind_addr = value("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let bind_port = value("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);
        let request_timeout = value("SOAP_REQUEST_TIMEOUT_SECS")
            .map(|value| parse_positive(&value, ConfigError::InvalidTimeout))
            .transpose()?
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let max_concurrent_requests = value("SOAP_MAX_CONCURRENT_REQUESTS")
            .map(|value| parse_positive(&value, ConfigError::InvalidConcurrency))
            .transpose()?
            .unwrap_or(DEFAULT_MAX_CONCURRENT_REQUESTS);
        let max_body_bytes = value("SOAP_MAX_BODY_BYTES")
            .map(|value| parse_positive(&value, ConfigError::InvalidBodyLimit))
            .transpose()?
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        let config = Self {
            service_name,
            published_host,
            bind_addr,
            bind_port,
            request_timeout,
            max_concurrent_requests,
            max_body_bytes,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            service_name: self.service_name.clone(),
            published_host: self.published_host.clone(),
            request_timeout: self.request_timeout,
            max_concurrent_requests: self.max_concurrent_requests,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

fn parse_positive(value: &str, error: ConfigError) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(error),
    }
}

/// First non-loopback IPv4 address of this host, or `127.0.0.1`.
pub fn detect_published_host() -> String {
    first_routable_ipv4(interface_ipv4_addrs())
        .unwrap_or(Ipv4Addr::LOCALHOST)
        .to_string()
}

fn first_routable_ipv4<I>(addrs: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = Ipv4Addr>,
{
    addrs
        .into_iter()
        .find(|addr| !addr.is_loopback() && !addr.is_unspecified())
}

#[cfg(unix)]
fn interface_ipv4_addrs() -> Vec<Ipv4Addr> {
    match nix::ifaddrs::getifaddrs() {
        Ok(interfaces) => interfaces
            .filter_map(|interface| {
                let address = interface.address?;
                address.as_sockaddr_in().map(|sin| Ipv4Addr::from(sin.ip()))
            })
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to list network interfaces");
            Vec::new()
        }
    }
}

#[cfg(not(unix))]
fn interface_ipv4_addrs() -> Vec<Ipv4Addr> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| vars.get(key).map(|value| value.to_string())
    }

    #[test]
    fn parse_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("SOAP_SERVICE_NAME", "people"),
            ("SOAP_PUBLISHED_HOST", "10.0.0.5"),
        ]))
        .expect("config should parse");

        assert_eq!(config.service_name, "people");
        assert_eq!(config.published_host, "10.0.0.5");
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.max_concurrent_requests, DEFAULT_MAX_CONCURRENT_REQUESTS);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn missing_service_name_fails() {
        let err = Config::from_lookup(lookup(&[("SOAP_SERVICE_NAME", "  ")]))
            .expect_err("expected missing service name error");
        assert_eq!(err, ConfigError::MissingServiceName);
    }

    #[test]
    fn service_name_with_slash_fails() {
        let err = Config::from_lookup(lookup(&[("SOAP_SERVICE_NAME", "a/b")]))
            .expect_err("expected invalid service name error");
        assert_eq!(err, ConfigError::InvalidServiceName);
    }

    #[test]
    fn limits_must_be_positive() {
        let err = Config::from_lookup(lookup(&[
            ("SOAP_SERVICE_NAME", "people"),
            ("SOAP_REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .expect_err("zero timeout fails");
        assert_eq!(err, ConfigError::InvalidTimeout);

        let err = Config::from_lookup(lookup(&[
            ("SOAP_SERVICE_NAME", "people"),
            ("SOAP_MAX_CONCURRENT_REQUESTS", "many"),
        ]))
        .expect_err("non numeric cap fails");
        assert_eq!(err, ConfigError::InvalidConcurrency);
    }

    #[test]
    fn invalid_port_fails() {
        let err = Config::from_lookup(lookup(&[
            ("SOAP_SERVICE_NAME", "people"),
            ("BIND_PORT", "70000"),
        ]))
        .expect_err("expected invalid port");
        assert_eq!(err, ConfigError::InvalidPort);
    }

    #[test]
    fn server_config_carries_published_host() {
        let config = Config::from_lookup(lookup(&[
            ("SOAP_SERVICE_NAME", "people"),
            ("SOAP_PUBLISHED_HOST", "example.org"),
            ("SOAP_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .expect("config should parse");

        let server = config.server_config();
        assert_eq!(server.target_namespace(), "http://example.org/people");
        assert_eq!(server.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn detected_host_is_an_ipv4_address() {
        let host = detect_published_host();
        assert!(host.parse::<Ipv4Addr>().is_ok());
    }

    #[test]
    fn first_routable_address_skips_loopback_and_unspecified() {
        let addrs = [
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(10, 1, 2, 3),
            Ipv4Addr::new(192, 168, 0, 7),
        ];
        assert_eq!(first_routable_ipv4(addrs), Some(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(first_routable_ipv4([Ipv4Addr::new(127, 0, 1, 1)]), None);
    }
}
