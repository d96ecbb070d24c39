use crate::error::AppError;
use tracing::{debug, error};

/// Parses `--header` values into name/value pairs.
///
/// Each value has the curl form `Name: value`; it is split at the first `:`
/// and both halves are trimmed. A missing colon or an empty name is rejected.
///
/// # Examples
///
/// ```
/// use m3u8dl::utils::parse_headers;
///
/// let headers = vec!["Referer: https://example.com/".to_string()];
/// let parsed = parse_headers(&headers).unwrap();
/// assert_eq!(parsed, vec![("Referer".to_string(), "https://example.com/".to_string())]);
/// ```
pub fn parse_headers(headers: &[String]) -> Result<Vec<(String, String)>, AppError> {
    debug!("Parsing {} headers", headers.len());

    headers
        .iter()
        .map(|header| {
            header
                .split_once(':')
                .map(|(name, value)| (name.trim(), value.trim()))
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| {
                    debug!(name, "Added header");
                    (name.to_string(), value.to_string())
                })
                .ok_or_else(|| {
                    error!("Invalid header format: {header}");
                    AppError::InvalidInput(format!(
                        "invalid header `{header}`, expected `Name: value`"
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_first_colon() {
        let parsed = parse_headers(&["Origin: http://h:8080".to_string()]).unwrap();
        assert_eq!(parsed, vec![("Origin".to_string(), "http://h:8080".to_string())]);
    }

    #[test]
    fn rejects_values_without_a_name() {
        assert!(parse_headers(&["no colon here".to_string()]).is_err());
        assert!(parse_headers(&[": value".to_string()]).is_err());
    }
}
