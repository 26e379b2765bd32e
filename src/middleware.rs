//! Rotation-aware middleware for reqwest.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};

use crate::config::RankerConfig;
use crate::rotation::RotationController;

/// Middleware that routes every request through the active rotation slot.
///
/// On a failed request the controller is rotated and the request retried
/// with the next proxy, up to the configured retry count. Consumers that
/// are not plain HTTP clients (e.g. browsers) should drive the
/// [`RotationController`] directly instead.
#[derive(Clone)]
pub struct RotatingProxyMiddleware {
    controller: Arc<RotationController>,
    timeout: Duration,
    retry_count: usize,
}

impl RotatingProxyMiddleware {
    pub fn new(controller: Arc<RotationController>, config: &RankerConfig) -> Self {
        Self {
            controller,
            timeout: config.probe_timeout,
            retry_count: config.retry_count,
        }
    }
}

#[async_trait]
impl Middleware for RotatingProxyMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0;

        loop {
            let entry = self
                .controller
                .current()
                .map_err(|e| Error::Middleware(anyhow!(e)))?
                .clone();

            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                ))
            })?;

            info!("using proxy {} (attempt {})", entry.proxy, attempt + 1);

            let limiter = self
                .controller
                .current_limiter()
                .map_err(|e| Error::Middleware(anyhow!(e)))?;
            limiter.until_ready().await;

            let reqwest_proxy = match entry.to_reqwest_proxy() {
                Ok(p) => p,
                Err(e) => {
                    warn!("failed to build proxy from {}: {}", entry.proxy, e);
                    attempt += 1;
                    if attempt > self.retry_count {
                        return Err(Error::Reqwest(e));
                    }
                    self.rotate_for_retry().await?;
                    continue;
                }
            };

            let client = match reqwest::Client::builder()
                .proxy(reqwest_proxy)
                .timeout(self.timeout)
                .build()
            {
                Ok(c) => c,
                Err(e) => {
                    warn!("failed to build client with proxy {}: {}", entry.proxy, e);
                    attempt += 1;
                    if attempt > self.retry_count {
                        return Err(Error::Reqwest(e));
                    }
                    self.rotate_for_retry().await?;
                    continue;
                }
            };

            match client.execute(proxied_request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(
                        "request failed with proxy {} (attempt {}): {}",
                        entry.proxy,
                        attempt + 1,
                        err
                    );
                    attempt += 1;
                    if attempt > self.retry_count {
                        return Err(Error::Reqwest(err));
                    }
                    self.rotate_for_retry().await?;
                }
            }
        }
    }
}

impl RotatingProxyMiddleware {
    async fn rotate_for_retry(&self) -> Result<()> {
        self.controller
            .rotate(None)
            .await
            .map_err(|e| Error::Middleware(anyhow!(e)))?;
        Ok(())
    }
}
