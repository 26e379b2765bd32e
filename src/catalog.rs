//! Fetching candidate proxies from a listing provider.

use std::cmp::Ordering;

use log::info;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::RankerConfig;
use crate::error::PoolError;
use crate::proxy::Proxy;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A provider-listed proxy that has not been probed yet.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub proxy: Proxy,
    /// Latency the provider claims to have measured, in seconds.
    pub average_timeout: f64,
}

/// Query the provider and return its quickest candidates, untested.
///
/// Provider-level failures are fatal: an unreachable provider, a non-JSON
/// body and a JSON body without the `proxies` array each surface as their
/// own error kind so callers never rank against malformed data.
pub async fn fetch_catalog(config: &RankerConfig) -> Result<Vec<Candidate>, PoolError> {
    let url = Url::parse(&config.provider_url)?;
    let client = Client::builder().user_agent(USER_AGENT).build()?;

    let protocol = config.protocol.to_string();
    let response = client
        .get(url)
        .query(&[
            ("request", "displayproxies"),
            ("protocol", protocol.as_str()),
            ("ssl", if config.ssl_required { "yes" } else { "all" }),
            ("anonymity", config.anonymity.as_str()),
            ("timeout", "10000"),
            ("proxy_format", "ipport"),
            ("format", "json"),
        ])
        .send()
        .await?;
    let body = response.text().await?;

    let candidates = parse_catalog(&body, config.search_size)?;
    info!(
        "provider returned {} usable candidates (keeping at most {})",
        candidates.len(),
        config.search_size
    );
    Ok(candidates)
}

/// Parse a provider response body into sorted, truncated candidates.
///
/// Entries missing any of `proxy`, `protocol`, `alive` or
/// `average_timeout`, reporting `alive: false`, or naming an unknown
/// protocol are skipped.
pub fn parse_catalog(body: &str, n: usize) -> Result<Vec<Candidate>, PoolError> {
    let value: Value = serde_json::from_str(body).map_err(PoolError::ProviderNotJson)?;
    let raw = value
        .get("proxies")
        .and_then(Value::as_array)
        .ok_or(PoolError::ProviderMissingProxies)?;

    let mut candidates: Vec<Candidate> = raw.iter().filter_map(parse_entry).collect();
    candidates.sort_by(|a, b| {
        a.average_timeout
            .partial_cmp(&b.average_timeout)
            .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(n);
    Ok(candidates)
}

fn parse_entry(entry: &Value) -> Option<Candidate> {
    let address = entry.get("proxy")?.as_str()?;
    let protocol = entry.get("protocol")?.as_str()?.parse().ok()?;
    if !entry.get("alive")?.as_bool()? {
        return None;
    }
    let average_timeout = entry.get("average_timeout")?.as_f64()?;

    Some(Candidate {
        proxy: Proxy::new(address, protocol),
        average_timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Protocol;

    const BODY: &str = r#"{
        "proxies": [
            {"proxy": "1.1.1.1:8080", "protocol": "http", "alive": true, "average_timeout": 2.5},
            {"proxy": "2.2.2.2:1080", "protocol": "socks5", "alive": true, "average_timeout": 0.8},
            {"proxy": "3.3.3.3:1080", "protocol": "socks5", "alive": false, "average_timeout": 0.1},
            {"proxy": "4.4.4.4:1080", "protocol": "gopher", "alive": true, "average_timeout": 0.2},
            {"proxy": "5.5.5.5:3128", "protocol": "https", "alive": true, "average_timeout": 1.4},
            {"protocol": "socks5", "alive": true, "average_timeout": 0.3}
        ]
    }"#;

    #[test]
    fn filters_sorts_and_truncates() {
        let candidates = parse_catalog(BODY, 2).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].proxy.address, "2.2.2.2:1080");
        assert_eq!(candidates[0].proxy.protocol, Protocol::Socks5);
        assert_eq!(candidates[1].proxy.address, "5.5.5.5:3128");
    }

    #[test]
    fn keeps_everything_when_n_exceeds_count() {
        let candidates = parse_catalog(BODY, 50).unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates
            .windows(2)
            .all(|w| w[0].average_timeout <= w[1].average_timeout));
    }

    #[test]
    fn non_json_body_is_a_format_error() {
        assert!(matches!(
            parse_catalog("<html>rate limited</html>", 10),
            Err(PoolError::ProviderNotJson(_))
        ));
    }

    #[test]
    fn json_without_proxies_key_is_a_distinct_error() {
        assert!(matches!(
            parse_catalog("{\"count\": 0}", 10),
            Err(PoolError::ProviderMissingProxies)
        ));
        assert!(matches!(
            parse_catalog("{\"proxies\": 3}", 10),
            Err(PoolError::ProviderMissingProxies)
        ));
    }

    #[test]
    fn empty_proxies_array_is_valid() {
        assert!(parse_catalog("{\"proxies\": []}", 10).unwrap().is_empty());
    }
}
