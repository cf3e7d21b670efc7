use url::Url;

/// Allowed range for a monitor's check interval, in seconds
pub const INTERVAL_RANGE: (u32, u32) = (30, 3600);
pub const DEFAULT_INTERVAL_SECONDS: u32 = 60;

/// Allowed range for a probe timeout, in milliseconds
pub const TIMEOUT_RANGE: (u32, u32) = (1000, 30000);
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;

/// Strip surrounding whitespace and stray backticks left over from copy-pasted markdown
pub fn clean_url(raw: &str) -> String {
    raw.trim().trim_matches('`').trim().to_string()
}

/// Validate an HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> Result<(), String> {
    if target.trim().is_empty() {
        return Err("Target cannot be empty".to_string());
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return Err(format!("Invalid scheme '{scheme}'. Must be http or https"));
            }

            if url.host_str().is_none_or(str::is_empty) {
                return Err("URL must have a valid host".to_string());
            }

            Ok(())
        }
        Err(e) => {
            if !target.contains("://") {
                Err("URL must include scheme (http:// or https://)".to_string())
            } else {
                Err(format!("Invalid URL: {e}"))
            }
        }
    }
}

fn clamp_to(value: Option<i64>, default: u32, (min, max): (u32, u32)) -> u32 {
    let clamped = value.unwrap_or(i64::from(default)).clamp(i64::from(min), i64::from(max));
    u32::try_from(clamped).unwrap_or(default)
}

/// Clamp a requested interval, falling back to the default when absent.
/// Any integer is accepted, negative ones included.
pub fn clamp_interval(seconds: Option<i64>) -> u32 {
    clamp_to(seconds, DEFAULT_INTERVAL_SECONDS, INTERVAL_RANGE)
}

/// Clamp a requested probe timeout, falling back to the default when absent
pub fn clamp_timeout(timeout_ms: Option<i64>) -> u32 {
    clamp_to(timeout_ms, DEFAULT_TIMEOUT_MS, TIMEOUT_RANGE)
}

/// Trimmed display name, `None` when blank
pub fn clean_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_validation() {
        assert!(validate_http_endpoint("http://example.com").is_ok());
        assert!(validate_http_endpoint("https://example.com").is_ok());
        assert!(validate_http_endpoint("http://192.168.1.1").is_ok());
        assert!(validate_http_endpoint("http://example.com:8080/path").is_ok());

        assert!(validate_http_endpoint("").is_err());
        assert!(validate_http_endpoint("example.com").is_err());
        assert!(validate_http_endpoint("ftp://example.com").is_err());
    }

    #[test]
    fn test_clean_url() {
        assert_eq!(clean_url("  https://example.com  "), "https://example.com");
        assert_eq!(clean_url("`https://example.com`"), "https://example.com");
        assert_eq!(clean_url(" ` https://example.com ` "), "https://example.com");
        assert_eq!(clean_url("``"), "");
    }

    #[test]
    fn test_clamping() {
        assert_eq!(clamp_interval(None), 60);
        assert_eq!(clamp_interval(Some(5)), 30);
        assert_eq!(clamp_interval(Some(90)), 90);
        assert_eq!(clamp_interval(Some(86400)), 3600);

        assert_eq!(clamp_timeout(None), 5000);
        assert_eq!(clamp_timeout(Some(10)), 1000);
        assert_eq!(clamp_timeout(Some(60000)), 30000);

        assert_eq!(clamp_interval(Some(-5)), 30);
        assert_eq!(clamp_interval(Some(i64::MAX)), 3600);
        assert_eq!(clamp_timeout(Some(i64::MIN)), 1000);
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name(Some("  Checkout API ")), Some("Checkout API".to_string()));
        assert_eq!(clean_name(Some("   ")), None);
        assert_eq!(clean_name(None), None);
    }
}
