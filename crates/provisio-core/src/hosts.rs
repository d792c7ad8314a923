use percent_encoding::percent_decode_str;
use url::Url;

/// Compute the trusted host names for the primary site.
///
/// Always starts with `base_domain`; the host of the percent-decoded
/// `site_url` follows when it parses to a non-empty host that is not already
/// in the list.
pub fn trusted_hosts(base_domain: &str, site_url: &str) -> Vec<String> {
    let mut hosts = vec![base_domain.to_string()];
    if let Some(host) = extract_host(site_url) {
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    hosts
}

/// Return the host of `site_url` after form-style decoding, if any.
///
/// `+` reads as a space and `%XX` escapes are resolved; malformed escapes are
/// kept literally. A value that decodes to invalid UTF-8 has no host.
pub fn extract_host(site_url: &str) -> Option<String> {
    let spaced = site_url.replace('+', " ");
    let decoded = percent_decode_str(&spaced).decode_utf8().ok()?;
    let parsed = Url::parse(decoded.trim()).ok()?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Some(host.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_domain_plus_site_host() {
        let hosts = trusted_hosts("example.org", "https://analytics.example.org/");
        assert_eq!(hosts, vec!["example.org", "analytics.example.org"]);
    }

    #[test]
    fn unparseable_site_url_keeps_base_domain_only() {
        assert_eq!(trusted_hosts("example.org", "not a url"), vec!["example.org"]);
        assert_eq!(trusted_hosts("example.org", "/relative/path"), vec!["example.org"]);
    }

    #[test]
    fn same_host_is_not_duplicated() {
        let hosts = trusted_hosts("example.org", "http://example.org:8080/piwik");
        assert_eq!(hosts, vec!["example.org"]);
    }

    #[test]
    fn percent_encoded_url_is_decoded_first() {
        let hosts = trusted_hosts("example.org", "https%3A%2F%2Fstats.example.org%2F");
        assert_eq!(hosts, vec!["example.org", "stats.example.org"]);
    }

    #[test]
    fn plus_and_malformed_escapes_survive_decoding() {
        assert_eq!(
            extract_host("https://stats.example.org/a+b%zz100%"),
            Some("stats.example.org".to_string())
        );
        assert_eq!(
            extract_host("+https%3A%2F%2Fstats.example.org"),
            Some("stats.example.org".to_string())
        );
    }

    #[test]
    fn invalid_utf8_escape_has_no_host() {
        let site_url = "https%3A%2F%2F%FFexample.org";
        assert_eq!(extract_host(site_url), None);
        assert_eq!(trusted_hosts("example.org", site_url), vec!["example.org"]);
    }
}
