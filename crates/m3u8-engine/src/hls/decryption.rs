// HLS Decryption: resolves the run's key and performs AES-128-CBC segment decryption.

use crate::DownloadError;
use crate::hls::config::IvPolicy;
use crate::hls::playlist::{KeyDirective, KeyMethod};
use crate::hls::retry::{RetryPolicy, retry_request};
use crate::transport::Transport;
use aes::Aes128;
use bytes::Bytes;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use std::sync::Arc;
use tracing::{debug, info};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const KEY_LEN: usize = 16;

/// Key material for a run. Resolved once, then shared read-only.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    raw: [u8; KEY_LEN],
    /// Explicit IV from the key directive
    iv: Option<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("raw", &"<redacted>")
            .field("iv", &self.iv.map(hex::encode))
            .finish()
    }
}

impl EncryptionKey {
    pub fn new(raw: [u8; KEY_LEN], iv: Option<[u8; KEY_LEN]>) -> Self {
        Self { raw, iv }
    }

    pub fn raw(&self) -> &[u8; KEY_LEN] {
        &self.raw
    }

    /// The IV for a segment. A manifest-supplied IV always wins over the policy.
    pub fn iv_for(&self, policy: IvPolicy, media_sequence: u64) -> [u8; KEY_LEN] {
        match (self.iv, policy) {
            (Some(iv), _) => iv,
            (None, IvPolicy::KeyAsIv) => self.raw,
            (None, IvPolicy::MediaSequence) => u64_to_iv_bytes(media_sequence),
        }
    }
}

fn u64_to_iv_bytes(val: u64) -> [u8; KEY_LEN] {
    let mut iv = [0u8; KEY_LEN];
    iv[8..].copy_from_slice(&val.to_be_bytes());
    iv
}

/// Offloads CPU-intensive decryption to blocking thread pool
#[derive(Debug, Clone, Copy)]
pub struct DecryptionOffloader {
    enabled: bool,
}

impl DecryptionOffloader {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Decrypt data, optionally offloading to blocking thread pool
    pub async fn decrypt(
        &self,
        data: Bytes,
        key: &[u8; KEY_LEN],
        iv: &[u8; KEY_LEN],
    ) -> Result<Bytes, DownloadError> {
        if self.enabled {
            let key = *key;
            let iv = *iv;
            tokio::task::spawn_blocking(move || Self::decrypt_sync(&data, &key, &iv))
                .await
                .map_err(|e| DownloadError::Internal {
                    reason: format!("decryption offload task failed: {e}"),
                })?
        } else {
            Self::decrypt_sync(&data, key, iv)
        }
    }

    /// AES-128-CBC decryption with PKCS#7 unpadding.
    pub fn decrypt_sync(
        data: &[u8],
        key: &[u8; KEY_LEN],
        iv: &[u8; KEY_LEN],
    ) -> Result<Bytes, DownloadError> {
        let mut buffer = data.to_vec();

        let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| {
            DownloadError::decryption(format!("failed to initialize AES decryptor: {e}"))
        })?;

        let decrypted_len = cipher
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map_err(|e| DownloadError::decryption(format!("decryption failed: {e}")))?
            .len();

        buffer.truncate(decrypted_len);
        Ok(Bytes::from(buffer))
    }
}

/// Resolves the key directive of a playlist into key bytes.
pub struct KeyResolver {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl KeyResolver {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// `Ok(None)` means the stream is not encrypted. Any failure to obtain a usable
    /// key is an error: segments cannot be decrypted without it.
    pub async fn resolve(
        &self,
        directive: Option<&KeyDirective>,
    ) -> Result<Option<EncryptionKey>, DownloadError> {
        let Some(directive) = directive else {
            debug!("Playlist has no key directive");
            return Ok(None);
        };

        match &directive.method {
            KeyMethod::None => return Ok(None),
            KeyMethod::Aes128 => {}
            KeyMethod::Other(method) => {
                return Err(DownloadError::configuration(format!(
                    "unsupported encryption method {method}"
                )));
            }
        }

        let uri = directive.uri.as_str();
        let body = self.fetch_key(uri).await?;

        let raw: [u8; KEY_LEN] = body
            .as_ref()
            .try_into()
            .map_err(|_| DownloadError::InvalidKey {
                url: uri.to_string(),
                len: body.len(),
            })?;

        info!(url = uri, explicit_iv = directive.iv.is_some(), "Resolved decryption key");
        Ok(Some(EncryptionKey::new(raw, directive.iv)))
    }

    async fn fetch_key(&self, uri: &str) -> Result<Bytes, DownloadError> {
        retry_request(&self.retry, "key", |attempt| async move {
            debug!(url = uri, attempt = attempt + 1, "Fetching key");
            self.transport.get(uri).await.and_then(|response| {
                if response.is_success() {
                    Ok(response.body)
                } else {
                    Err(DownloadError::http_status(response.status, uri, "key fetch"))
                }
            })
        })
        .await
        .map_err(|e| DownloadError::key_fetch(uri, e.to_string()))
    }
}
