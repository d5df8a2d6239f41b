use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::error::AppError;

/// Parse a header string in format "Name: Value" and add it to the HeaderMap
pub fn parse_and_add_header(headers: &mut HeaderMap, header_str: &str) -> Result<(), AppError> {
    // Find the first colon which separates name and value
    let Some((name, value)) = header_str.split_once(':') else {
        return Err(AppError::InvalidInput(format!(
            "Invalid header format: '{header_str}'. Expected 'Name: Value'"
        )));
    };

    let name = name.trim();
    let value = value.trim();

    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| AppError::InvalidInput(format!("Invalid header name: '{name}'")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| AppError::InvalidInput(format!("Invalid value for header '{name}'")))?;

    // Values may carry credentials, so only the name is logged.
    debug!(header = %name, "Adding custom header");
    headers.append(header_name, header_value);
    Ok(())
}

/// Parse a collection of header strings and return a HeaderMap
pub fn parse_headers(header_strings: &[String]) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();

    for header_str in header_strings {
        parse_and_add_header(&mut headers, header_str)?;
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_value_pairs() {
        let headers = parse_headers(&[
            "Referer: https://example.com/watch?v=1".to_string(),
            "X-Token:abc".to_string(),
        ])
        .unwrap();
        assert_eq!(headers["referer"], "https://example.com/watch?v=1");
        assert_eq!(headers["x-token"], "abc");
    }

    #[test]
    fn missing_colon_is_rejected() {
        let err = parse_headers(&["Referer https://example.com".to_string()]).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let err = parse_headers(&["Bad Name: value".to_string()]).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
