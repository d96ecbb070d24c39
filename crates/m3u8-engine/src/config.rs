use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::DownloadError;
use crate::proxy::{ProxyConfig, build_proxy_from_config};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_13_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.88 Safari/537.36";

/// Configurable options for the HTTP transport
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Overall timeout for a single HTTP request (playlist, key or segment)
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Raw `Cookie` header value sent with every request
    pub cookie: Option<String>,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,

    pub danger_accept_invalid_certs: bool, // For reqwest's `danger_accept_invalid_certs`
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: DownloaderConfig::get_default_headers(),
            cookie: None,
            proxy: None,
            use_system_proxy: true,
            danger_accept_invalid_certs: false,
        }
    }
}

impl DownloaderConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-Hans;q=1, en-US;q=0.8"),
        );
        default_headers
    }

    /// Merge user supplied `name: value` pairs on top of the current headers.
    pub fn with_extra_headers<'a>(
        mut self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, DownloadError> {
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
                DownloadError::configuration(format!("invalid header name `{name}`: {e}"))
            })?;
            let value = HeaderValue::from_str(value.trim()).map_err(|e| {
                DownloadError::configuration(format!("invalid header value for `{name}`: {e}"))
            })?;
            self.headers.insert(name, value);
        }
        Ok(self)
    }

    /// Build the reqwest client used by [`crate::HttpTransport`].
    pub fn build_client(&self) -> Result<Client, DownloadError> {
        let mut headers = self.headers.clone();
        if let Some(cookie) = self.cookie.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(cookie).map_err(|e| {
                DownloadError::configuration(format!("invalid cookie header: {e}"))
            })?;
            headers.insert(reqwest::header::COOKIE, value);
        }

        let redirect = if self.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .default_headers(headers)
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .redirect(redirect)
            .danger_accept_invalid_certs(self.danger_accept_invalid_certs);

        if let Some(proxy_config) = &self.proxy {
            let proxy =
                build_proxy_from_config(proxy_config).map_err(DownloadError::configuration)?;
            builder = builder.proxy(proxy);
        } else if !self.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_headers_override_defaults() {
        let config = DownloaderConfig::default()
            .with_extra_headers([("Accept", "video/mp2t"), ("Referer", "http://h/")])
            .unwrap();
        assert_eq!(config.headers.get("accept").unwrap(), "video/mp2t");
        assert_eq!(config.headers.get("referer").unwrap(), "http://h/");
    }

    #[test]
    fn invalid_header_name_is_a_configuration_error() {
        let err = DownloaderConfig::default()
            .with_extra_headers([("bad header", "x")])
            .unwrap_err();
        assert!(matches!(err, DownloadError::Configuration { .. }));
    }

    #[test]
    fn builds_client_with_cookie() {
        let config = DownloaderConfig {
            cookie: Some("session=abc".to_string()),
            ..Default::default()
        };
        assert!(config.build_client().is_ok());
    }
}
