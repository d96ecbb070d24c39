// Playlist parsing: turns manifest text into ordered segment descriptors and the
// optional key directive.

use tracing::{debug, warn};
use url::Url;

use crate::DownloadError;
use crate::hls::config::HostMode;

const KEY_TAG: &str = "#EXT-X-KEY";
const MEDIA_SEQUENCE_TAG: &str = "#EXT-X-MEDIA-SEQUENCE:";
const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";

/// One media segment to fetch, in manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// 1-based position in the manifest
    pub sequence: u32,
    /// Absolute segment URL
    pub uri: String,
    /// Fixed-width local file name, e.g. `00001.ts`
    pub name: String,
}

impl SegmentDescriptor {
    pub fn new(sequence: u32, uri: impl Into<String>, extension: &str) -> Self {
        Self {
            sequence,
            uri: uri.into(),
            name: segment_file_name(sequence, extension),
        }
    }
}

/// Zero-padded to five digits; sequences past 99,999 simply get wider names.
pub fn segment_file_name(sequence: u32, extension: &str) -> String {
    format!("{sequence:05}.{extension}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMethod {
    None,
    Aes128,
    Other(String),
}

impl KeyMethod {
    fn parse(value: &str) -> Self {
        match value {
            "NONE" => KeyMethod::None,
            "AES-128" => KeyMethod::Aes128,
            other => KeyMethod::Other(other.to_string()),
        }
    }
}

/// The `#EXT-X-KEY` line the run decrypts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDirective {
    pub method: KeyMethod,
    /// Absolute key URL
    pub uri: String,
    pub iv: Option<[u8; 16]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    pub segments: Vec<SegmentDescriptor>,
    pub key: Option<KeyDirective>,
    /// Value of `#EXT-X-MEDIA-SEQUENCE`, 0 when absent
    pub media_sequence: u64,
    /// Set when the manifest references other manifests; those are not expanded
    pub has_variants: bool,
}

/// Whether a manifest line carries its own scheme.
pub fn is_absolute(line: &str) -> bool {
    let lower = line.get(..8).unwrap_or(line).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `base + "/" + relative`, or the line itself when it is already absolute.
pub fn join_with_base(base: &str, line: &str) -> String {
    if is_absolute(line) {
        line.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            line.trim_start_matches('/')
        )
    }
}

/// Derive the base host that relative URIs are joined with.
pub fn resolve_base(playlist_url: &str, mode: HostMode) -> Result<String, DownloadError> {
    let url = Url::parse(playlist_url)
        .map_err(|e| DownloadError::invalid_url(playlist_url, e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| DownloadError::invalid_url(playlist_url, "missing host"))?;

    let mut base = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        base.push_str(&format!(":{port}"));
    }

    if mode == HostMode::PathDir {
        let dir = url
            .path()
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or_default();
        base.push_str(dir);
    }

    Ok(base)
}

/// Parse manifest text. Never fails; lines that are neither tags nor URIs are ignored.
pub fn parse_playlist(body: &str, base: &str, extension: &str) -> Playlist {
    let mut playlist = Playlist::default();
    let mut sequence = 0u32;

    for raw_line in body.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            if line.starts_with(KEY_TAG) {
                if playlist.key.is_none() {
                    playlist.key = parse_key_line(line, base);
                }
            } else if let Some(value) = line.strip_prefix(MEDIA_SEQUENCE_TAG) {
                playlist.media_sequence = value.trim().parse().unwrap_or_else(|_| {
                    warn!(value, "Ignoring unparsable media sequence");
                    0
                });
            } else if line.starts_with(STREAM_INF_TAG) {
                playlist.has_variants = true;
            }
            continue;
        }

        sequence += 1;
        playlist
            .segments
            .push(SegmentDescriptor::new(sequence, join_with_base(base, line), extension));
    }

    debug!(
        segments = playlist.segments.len(),
        encrypted = playlist.key.is_some(),
        media_sequence = playlist.media_sequence,
        "Parsed playlist"
    );

    playlist
}

fn parse_key_line(line: &str, base: &str) -> Option<KeyDirective> {
    let attributes = line.split_once(':').map(|(_, attrs)| attrs)?;
    let mut method = KeyMethod::Aes128;
    let mut uri = None;
    let mut iv = None;

    for (name, value) in split_attributes(attributes) {
        match name {
            "METHOD" => method = KeyMethod::parse(value),
            "URI" => uri = Some(value),
            "IV" => {
                iv = parse_iv(value);
                if iv.is_none() {
                    warn!(iv = value, "Ignoring malformed key IV");
                }
            }
            _ => {}
        }
    }

    if method == KeyMethod::None {
        return Some(KeyDirective {
            method,
            uri: String::new(),
            iv: None,
        });
    }

    let uri = uri.filter(|u| !u.is_empty())?;
    Some(KeyDirective {
        method,
        uri: join_with_base(base, uri),
        iv,
    })
}

/// Split an attribute list on commas that are outside quoted strings.
fn split_attributes(list: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, c) in list.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                push_attribute(&list[start..i], &mut out);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_attribute(&list[start..], &mut out);
    out
}

fn push_attribute<'a>(pair: &'a str, out: &mut Vec<(&'a str, &'a str)>) {
    if let Some((name, value)) = pair.split_once('=') {
        out.push((name.trim(), value.trim().trim_matches('"')));
    }
}

pub(crate) fn parse_iv(value: &str) -> Option<[u8; 16]> {
    let hex_str = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let mut iv = [0u8; 16];
    hex::decode_to_slice(hex_str, &mut iv).ok()?;
    Some(iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://h/p";

    #[test]
    fn assigns_sequences_in_line_order() {
        let body = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\nseg1.ts\n\n#EXTINF:10,\nseg2.ts\n#EXTINF:10,\nhttp://cdn/seg3.ts\n#EXT-X-ENDLIST\n";
        let playlist = parse_playlist(body, BASE, "ts");

        assert_eq!(playlist.segments.len(), 3);
        let sequences: Vec<u32> = playlist.segments.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(playlist.segments[0].name, "00001.ts");
        assert_eq!(playlist.segments[2].name, "00003.ts");
        assert!(playlist.key.is_none());
    }

    #[test]
    fn relative_lines_join_base_and_absolute_pass_through() {
        let playlist = parse_playlist("seg1.ts\nhttps://other/x/seg2.ts\n", BASE, "ts");
        assert_eq!(playlist.segments[0].uri, "http://h/p/seg1.ts");
        assert_eq!(playlist.segments[1].uri, "https://other/x/seg2.ts");
    }

    #[test]
    fn handles_crlf_line_endings() {
        let playlist = parse_playlist("#EXTM3U\r\nseg1.ts\r\n\r\nseg2.ts\r\n", BASE, "ts");
        assert_eq!(playlist.segments.len(), 2);
        assert_eq!(playlist.segments[1].uri, "http://h/p/seg2.ts");
    }

    #[test]
    fn extracts_key_directive() {
        let body = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:7\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.key\",IV=0x000102030405060708090a0b0c0d0e0f\nseg1.ts\n";
        let playlist = parse_playlist(body, BASE, "ts");

        let key = playlist.key.expect("key directive");
        assert_eq!(key.method, KeyMethod::Aes128);
        assert_eq!(key.uri, "http://h/p/key.key");
        assert_eq!(
            key.iv,
            Some([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15])
        );
        assert_eq!(playlist.media_sequence, 7);
        assert_eq!(playlist.segments.len(), 1);
    }

    #[test]
    fn quoted_uri_may_contain_commas() {
        let body = "#EXT-X-KEY:METHOD=AES-128,URI=\"https://k/get?a=1,b=2\"\nseg.ts\n";
        let key = parse_playlist(body, BASE, "ts").key.unwrap();
        assert_eq!(key.uri, "https://k/get?a=1,b=2");
        assert_eq!(key.iv, None);
    }

    #[test]
    fn only_first_key_directive_is_used() {
        let body = "#EXT-X-KEY:METHOD=AES-128,URI=\"a.key\"\nseg1.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"b.key\"\nseg2.ts\n";
        let key = parse_playlist(body, BASE, "ts").key.unwrap();
        assert_eq!(key.uri, "http://h/p/a.key");
    }

    #[test]
    fn method_none_means_unencrypted() {
        let key = parse_playlist("#EXT-X-KEY:METHOD=NONE\nseg.ts\n", BASE, "ts")
            .key
            .unwrap();
        assert_eq!(key.method, KeyMethod::None);
    }

    #[test]
    fn flags_master_playlists() {
        let body = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n";
        let playlist = parse_playlist(body, BASE, "ts");
        assert!(playlist.has_variants);
        // Not expanded: the variant line is treated as a segment.
        assert_eq!(playlist.segments.len(), 1);
    }

    #[test]
    fn resolves_base_per_host_mode() {
        let url = "https://example.com:8443/live/a/index.m3u8?token=1";
        assert_eq!(
            resolve_base(url, HostMode::PathDir).unwrap(),
            "https://example.com:8443/live/a"
        );
        assert_eq!(
            resolve_base(url, HostMode::HostOnly).unwrap(),
            "https://example.com:8443"
        );
        assert_eq!(
            resolve_base("http://h/index.m3u8", HostMode::PathDir).unwrap(),
            "http://h"
        );
    }

    #[test]
    fn file_names_sort_in_sequence_order() {
        let mut names = vec![
            segment_file_name(10, "ts"),
            segment_file_name(2, "ts"),
            segment_file_name(100, "ts"),
        ];
        names.sort();
        assert_eq!(names, vec!["00002.ts", "00010.ts", "00100.ts"]);
    }
}
