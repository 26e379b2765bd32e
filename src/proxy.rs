//! Proxy descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PoolError;

/// Wire protocol spoken by a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "socks4" => Ok(Protocol::Socks4),
            "socks5" => Ok(Protocol::Socks5),
            _ => Err(PoolError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// An immutable proxy endpoint: `host:port` plus the protocol to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proxy {
    /// The proxy endpoint as `host:port`.
    pub address: String,
    pub protocol: Protocol,
}

impl Proxy {
    pub fn new(address: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            address: address.into(),
            protocol,
        }
    }

    /// The full proxy URL, e.g. `socks5://127.0.0.1:1080`.
    pub fn url(&self) -> String {
        format!("{}://{}", self.protocol, self.address)
    }

    /// Convert to a `reqwest::Proxy` routing all traffic through this endpoint.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(self.url())
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.address)
    }
}

impl FromStr for Proxy {
    type Err = PoolError;

    /// Parse `proto://host:port`. A missing scheme defaults to http.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (protocol, rest) = split_scheme(s)?;

        if !rest.contains(':') {
            return Err(PoolError::InvalidProxy(s.to_string()));
        }

        let proxy = Proxy::new(rest, protocol);
        Url::parse(&proxy.url()).map_err(|_| PoolError::InvalidProxy(s.to_string()))?;
        Ok(proxy)
    }
}

/// Username and password for a proxy requiring authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// A caller-supplied proxy with credentials.
///
/// Authenticated proxies are assumed trusted and are never probed; they
/// enter a pool only through the trusted merge paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedProxy {
    pub proxy: Proxy,
    pub auth: ProxyAuth,
}

impl AuthenticatedProxy {
    pub fn new(proxy: Proxy, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            proxy,
            auth: ProxyAuth {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    /// Convert to a `reqwest::Proxy` with basic auth applied.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        Ok(self
            .proxy
            .to_reqwest_proxy()?
            .basic_auth(&self.auth.username, &self.auth.password))
    }
}

impl FromStr for AuthenticatedProxy {
    type Err = PoolError;

    /// Parse `proto://host:port:user:password`. A missing scheme defaults to http.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (protocol, rest) = split_scheme(s)?;

        let parts: Vec<&str> = rest.split(':').collect();
        let [host, port, username, password] = parts.as_slice() else {
            return Err(PoolError::InvalidProxy(s.to_string()));
        };

        let proxy = Proxy::new(format!("{host}:{port}"), protocol);
        Url::parse(&proxy.url()).map_err(|_| PoolError::InvalidProxy(s.to_string()))?;
        Ok(AuthenticatedProxy::new(proxy, *username, *password))
    }
}

fn split_scheme(s: &str) -> Result<(Protocol, &str), PoolError> {
    match s.split_once("://") {
        Some((scheme, rest)) => Ok((scheme.parse()?, rest)),
        None => Ok((Protocol::Http, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_descriptor() {
        let proxy: Proxy = "socks5://127.0.0.1:1080".parse().unwrap();
        assert_eq!(proxy.address, "127.0.0.1:1080");
        assert_eq!(proxy.protocol, Protocol::Socks5);
        assert_eq!(proxy.url(), "socks5://127.0.0.1:1080");
    }

    #[test]
    fn missing_scheme_defaults_to_http() {
        let proxy: Proxy = "10.0.0.1:8080".parse().unwrap();
        assert_eq!(proxy.protocol, Protocol::Http);
    }

    #[test]
    fn rejects_descriptor_without_port() {
        assert!(matches!(
            "socks5://127.0.0.1".parse::<Proxy>(),
            Err(PoolError::InvalidProxy(_))
        ));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            "ftp://127.0.0.1:21".parse::<Proxy>(),
            Err(PoolError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn parses_authenticated_descriptor() {
        let proxy: AuthenticatedProxy = "https://127.0.0.1:8080:user:secret".parse().unwrap();
        assert_eq!(proxy.proxy.address, "127.0.0.1:8080");
        assert_eq!(proxy.proxy.protocol, Protocol::Https);
        assert_eq!(proxy.auth.username, "user");
        assert_eq!(proxy.auth.password, "secret");
    }

    #[test]
    fn authenticated_descriptor_needs_all_components() {
        assert!("https://127.0.0.1:8080:user".parse::<AuthenticatedProxy>().is_err());
        assert!("https://127.0.0.1:8080".parse::<AuthenticatedProxy>().is_err());
    }

    #[test]
    fn protocol_round_trips_through_serde() {
        let json = serde_json::to_string(&Protocol::Socks4).unwrap();
        assert_eq!(json, "\"socks4\"");
        let back: Protocol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Protocol::Socks4);
    }
}
