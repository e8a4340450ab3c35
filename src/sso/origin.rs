//! Redirect target validation against the fixed set of trusted origins.
//!
//! Every entry point that accepts a `redirect` query parameter runs the
//! candidate through [`OriginAllowList::is_allowed`] before the value is
//! used anywhere. Matching is exact on the normalized origin (scheme, host,
//! port); path, query and fragment never participate. Anything that does not
//! parse as an absolute URL is rejected.

use url::Url;

#[derive(Debug, Clone)]
pub struct OriginAllowList {
    origins: Vec<String>,
}

impl OriginAllowList {
    /// Build the allow-list from configured origin strings.
    ///
    /// Returns the offending entry if one does not parse as an absolute
    /// origin, so configuration fails fast instead of silently shrinking
    /// the list.
    pub fn new(configured: &[String]) -> Result<Self, String> {
        let mut origins = Vec::with_capacity(configured.len());
        for entry in configured {
            match normalized_origin(entry) {
                Some(origin) => origins.push(origin),
                None => return Err(entry.clone()),
            }
        }
        Ok(Self { origins })
    }

    /// True iff the candidate parses as an absolute URL whose origin exactly
    /// matches a trusted origin. Fail closed on anything malformed.
    pub fn is_allowed(&self, candidate: &str) -> bool {
        match normalized_origin(candidate) {
            Some(origin) => self.origins.iter().any(|o| *o == origin),
            None => false,
        }
    }

    /// Validate an optional untrusted `redirect` parameter. Disallowed
    /// values degrade to `None` with a server-side audit record; the caller
    /// must never surface the rejection to the client.
    pub fn validate_redirect(&self, candidate: Option<&str>) -> Option<String> {
        let candidate = candidate?;
        if self.is_allowed(candidate) {
            Some(candidate.to_string())
        } else {
            tracing::warn!(redirect = %candidate, "Rejected untrusted redirect target");
            None
        }
    }
}

/// Serialize the origin of an absolute URL as `scheme://host[:port]`,
/// with the port omitted when it is the scheme default.
pub(crate) fn normalized_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist() -> OriginAllowList {
        OriginAllowList::new(&[
            "https://subz.supermatt.agency".to_string(),
            "https://trax.supermatt.agency".to_string(),
            "https://supermatt.agency".to_string(),
            "http://localhost:3000".to_string(),
            "http://localhost:5173".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn trusted_origin_with_path_and_query_is_allowed() {
        let list = allowlist();
        assert!(list.is_allowed("https://trax.supermatt.agency"));
        assert!(list.is_allowed("https://trax.supermatt.agency/sso-callback"));
        assert!(list.is_allowed("https://trax.supermatt.agency/cb?x=1&y=2"));
        assert!(list.is_allowed("http://localhost:3000/api/auth/sso-callback"));
    }

    #[test]
    fn unparseable_candidates_fail_closed() {
        let list = allowlist();
        assert!(!list.is_allowed(""));
        assert!(!list.is_allowed("not a url"));
        assert!(!list.is_allowed("/relative/path"));
        assert!(!list.is_allowed("//trax.supermatt.agency/cb"));
        assert!(!list.is_allowed("javascript:alert(1)"));
    }

    #[test]
    fn scheme_host_and_port_must_match_exactly() {
        let list = allowlist();
        // scheme differs
        assert!(!list.is_allowed("http://trax.supermatt.agency/cb"));
        // host differs, including lookalike prefixes and suffixes
        assert!(!list.is_allowed("https://evil.example/cb"));
        assert!(!list.is_allowed("https://trax.supermatt.agency.evil.example/cb"));
        assert!(!list.is_allowed("https://eviltrax.supermatt.agency.example/cb"));
        // subdomain of a trusted apex is not the apex
        assert!(!list.is_allowed("https://sub.supermatt.agency/cb"));
        // port differs
        assert!(!list.is_allowed("http://localhost:3001/cb"));
        assert!(!list.is_allowed("https://trax.supermatt.agency:8443/cb"));
    }

    #[test]
    fn no_substring_matching_on_userinfo_tricks() {
        let list = allowlist();
        assert!(!list.is_allowed("https://trax.supermatt.agency@evil.example/cb"));
        assert!(!list.is_allowed("https://evil.example/?https://trax.supermatt.agency"));
    }

    #[test]
    fn default_port_is_normalized_away() {
        let list = allowlist();
        assert!(list.is_allowed("https://trax.supermatt.agency:443/cb"));
        assert!(list.is_allowed("http://localhost:3000/cb"));
    }

    #[test]
    fn invalid_configured_entry_is_reported() {
        let err = OriginAllowList::new(&["nonsense".to_string()]).unwrap_err();
        assert_eq!(err, "nonsense");
    }

    #[test]
    fn validate_redirect_silently_drops_untrusted_values() {
        let list = allowlist();
        assert_eq!(list.validate_redirect(None), None);
        assert_eq!(list.validate_redirect(Some("https://evil.example/cb")), None);
        assert_eq!(
            list.validate_redirect(Some("https://trax.supermatt.agency/cb")),
            Some("https://trax.supermatt.agency/cb".to_string())
        );
    }
}
