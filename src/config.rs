/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::{self, Error};
use crate::http::{HttpTransport, TransportConfig};
use crate::region::RegionCache;
use crate::types::Credentials;
use crate::DEFAULT_CONCURRENCY;

/// Configuration for a [`Client`](crate::client::Client)
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) endpoint: Endpoint,
    pub(crate) region: Option<String>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) transport: Option<Arc<dyn HttpTransport>>,
    pub(crate) region_cache: Option<RegionCache>,
    pub(crate) app_info: Option<(String, String)>,
    pub(crate) transport_config: TransportConfig,
    pub(crate) concurrency: usize,
}

impl Config {
    /// Create a new `Config` builder for the given endpoint.
    ///
    /// The endpoint is a host, `host:port` or `http(s)://` URL with an
    /// empty path; a bare host defaults to HTTPS.
    pub fn builder(endpoint: impl Into<String>) -> Builder {
        Builder::new(endpoint)
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The fixed region, if one was configured.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// The configured credentials; anonymous access when absent.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub(crate) fn user_agent(&self) -> String {
        let mut ua = format!(
            "S3ObjectClient ({}; {}) s3-object-client/{}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            env!("CARGO_PKG_VERSION")
        );
        if let Some((name, version)) = &self.app_info {
            ua.push_str(&format!(" {name}/{version}"));
        }
        ua
    }
}

/// Fluent style builder for [`Config`]
#[derive(Debug, Default)]
pub struct Builder {
    endpoint: String,
    secure: Option<bool>,
    region: Option<String>,
    credentials: Option<Credentials>,
    transport: Option<Arc<dyn HttpTransport>>,
    region_cache: Option<RegionCache>,
    app_info: Option<(String, String)>,
    transport_config: TransportConfig,
    concurrency: usize,
}

impl Builder {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            concurrency: DEFAULT_CONCURRENCY,
            ..Default::default()
        }
    }

    /// Force HTTPS on or off, overriding the endpoint scheme.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Pin every request to this region, skipping discovery.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Use the given credentials. Without credentials all requests are
    /// anonymous and unsigned.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Replace the HTTP transport. The transport must be safe for
    /// concurrent use; it owns pooling, TLS and timeouts.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a dedicated region cache instead of the process-wide one.
    pub fn region_cache(mut self, cache: RegionCache) -> Self {
        self.region_cache = Some(cache);
        self
    }

    /// Identify the calling application in the `User-Agent` header.
    pub fn app_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app_info = Some((name.into(), version.into()));
        self
    }

    /// Timeouts for the default transport. Ignored when an explicit
    /// transport is set; only affects requests issued after the client is
    /// built.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Maximum number of concurrent part uploads per operation.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Validate the settings and construct a [`Config`].
    pub fn build(self) -> Result<Config, Error> {
        let mut endpoint: Endpoint = self.endpoint.parse()?;
        if let Some(secure) = self.secure {
            endpoint.set_secure(secure);
        }
        if let Some(region) = &self.region {
            if region.is_empty() {
                return Err(error::invalid_argument("region must not be empty"));
            }
        }
        Ok(Config {
            endpoint,
            region: self.region,
            credentials: self.credentials,
            transport: self.transport,
            region_cache: self.region_cache,
            app_info: self.app_info,
            transport_config: self.transport_config,
            concurrency: self.concurrency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let config = Config::builder("play.min.io").build().unwrap();
        assert!(config.endpoint().is_secure());
        assert!(config.credentials().is_none());
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn secure_overrides_endpoint_scheme() {
        let config = Config::builder("http://localhost:9000")
            .secure(true)
            .build()
            .unwrap();
        assert!(config.endpoint().is_secure());
    }

    #[test]
    fn user_agent_carries_app_info() {
        let config = Config::builder("play.min.io")
            .app_info("backup-tool", "2.1.0")
            .build()
            .unwrap();
        let ua = config.user_agent();
        assert!(ua.starts_with("S3ObjectClient ("));
        assert!(ua.ends_with(" backup-tool/2.1.0"));
    }

    #[test]
    fn rejects_empty_region() {
        assert!(Config::builder("play.min.io").region("").build().is_err());
    }
}
