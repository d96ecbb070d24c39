use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use m3u8_engine::hls::{GapPolicy, HlsConfig, HostMode, IvPolicy, VerifyMode};
use m3u8_engine::proxy::{ProxyConfig, ProxyType};

use crate::error::{AppError, Result};
use crate::utils::parse_headers;

#[derive(Parser, Debug)]
#[command(
    name = "m3u8dl",
    author,
    version,
    about = "Download an m3u8 playlist and merge its segments into one file",
    long_about = None
)]
pub struct Args {
    /// Playlist URL, e.g. https://host/path/index.m3u8
    #[arg(short = 'u', long, env = "M3U8DL_URL")]
    pub url: String,

    /// Name of the download: segments go to <OUTPUT_DIR>/<NAME>/, the merged
    /// file to <OUTPUT_DIR>/<NAME>.mp4
    #[arg(short = 'o', long = "name", default_value = "temp")]
    pub name: String,

    /// Directory holding all downloads
    #[arg(long, default_value = "download")]
    pub output_dir: PathBuf,

    /// Segments downloaded at the same time
    #[arg(short = 'n', long = "threads", default_value_t = 4)]
    pub concurrency: usize,

    /// How relative segment and key URIs are resolved
    #[arg(long = "ht", value_enum, default_value = "apiv1")]
    pub host_mode: HostMode,

    /// Cookie header sent with every request
    #[arg(short = 'c', long, env = "M3U8DL_COOKIE")]
    pub cookie: Option<String>,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Attempts per segment before it is given up
    #[arg(long, default_value_t = 20)]
    pub attempts: u32,

    /// Retries for the playlist and key requests
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// What two consecutive attempts must agree on
    #[arg(long, value_enum, default_value = "sha256")]
    pub verify: VerifyMode,

    /// IV used when the playlist does not carry one
    #[arg(long, value_enum, default_value = "key-as-iv")]
    pub iv_policy: IvPolicy,

    /// What to do with segments that failed to download when merging
    #[arg(long, value_enum, default_value = "omit")]
    pub gap_policy: GapPolicy,

    /// Keep the segments but do not merge them
    #[arg(long)]
    pub no_merge: bool,

    /// Delete the segment directory after a successful merge
    #[arg(long)]
    pub cleanup: bool,

    /// Exit with an error when any segment failed
    #[arg(long)]
    pub strict: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Proxy URL (http://, https:// or socks5://)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Proxy type; inferred from the proxy URL when omitted
    #[arg(long, value_enum, requires = "proxy")]
    pub proxy_type: Option<ProxyType>,

    #[arg(long, requires = "proxy")]
    pub proxy_user: Option<String>,

    #[arg(long, requires = "proxy_user")]
    pub proxy_pass: Option<String>,

    /// Ignore the system proxy settings
    #[arg(long)]
    pub no_system_proxy: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Map the command line onto the engine configuration.
    pub fn to_config(&self) -> Result<HlsConfig> {
        if self.concurrency == 0 {
            return Err(AppError::InvalidInput(
                "--threads must be at least 1".to_string(),
            ));
        }

        let mut config = HlsConfig::default();

        let headers = parse_headers(&self.headers)?;
        config.base = config
            .base
            .with_extra_headers(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        config.base.timeout = Duration::from_secs(self.timeout);
        config.base.cookie = self.cookie.clone().filter(|c| !c.is_empty());
        config.base.use_system_proxy = !self.no_system_proxy;
        config.base.danger_accept_invalid_certs = self.insecure;
        config.base.proxy = self.proxy.as_ref().map(|url| {
            let mut proxy = ProxyConfig::from_url(url.clone());
            if let Some(proxy_type) = self.proxy_type {
                proxy.proxy_type = proxy_type;
            }
            proxy.auth = self
                .proxy_user
                .clone()
                .map(|user| (user, self.proxy_pass.clone().unwrap_or_default()));
            proxy
        });

        config.playlist_config.host_mode = self.host_mode;
        config.scheduler_config.download_concurrency = self.concurrency;
        config.fetcher_config.max_segment_attempts = self.attempts;
        config.fetcher_config.max_resource_retries = self.retries;
        config.fetcher_config.verify_mode = self.verify;
        config.decryption_config.iv_policy = self.iv_policy;
        config.output_config.gap_policy = self.gap_policy;
        config.output_config.merge_segments = !self.no_merge;
        config.output_config.cleanup_segments = self.cleanup;

        config.validate()?;
        Ok(config)
    }
}
