//! Domain-hierarchy helpers for cookie scoping (spec §4.A).
//!
//! The original implementation's top-domain computation mixes a naive
//! last-two-labels split with ad hoc TLD handling; spec §9 flags this as an
//! Open Question and requires a correct Public Suffix List rule. This module
//! uses the `psl` crate (which embeds the Mozilla Public Suffix List at
//! compile time) for the registrable-domain computation and then builds
//! progressively-shorter dotted suffixes down to that domain, in both plain
//! and dot-prefixed form, the shape `get()` needs to query rows keyed by
//! historical `Domain=.example.test`-style cookie attributes.

/// The registrable ("top") domain of `host`, e.g. `a.b.example.com` → `example.com`.
/// Falls back to `host` itself when the PSL can't resolve it (bare hostnames,
/// `localhost`, raw IPs).
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    match psl::domain(host.as_bytes()) {
        Some(domain) => String::from_utf8_lossy(domain.as_bytes()).into_owned(),
        None => host,
    }
}

/// All candidate domain strings a stored cookie's `domain` column might match
/// for a lookup against `host`, ordered from most-specific to least: the
/// full host, then each shortened suffix down to (and including) the
/// registrable domain, each emitted in both plain (`example.com`) and
/// dot-prefixed (`.example.com`) form, matching the two ways `Domain=` is
/// historically written.
pub fn candidate_domains(host: &str) -> Vec<String> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let top = registrable_domain(&host);

    let mut candidates = Vec::new();
    let mut current = host.as_str();
    loop {
        candidates.push(current.to_string());
        candidates.push(format!(".{current}"));

        if current == top || !current.contains('.') {
            break;
        }
        match current.split_once('.') {
            Some((_, rest)) if rest.len() >= top.len() => current = rest,
            _ => break,
        }
    }
    candidates
}

/// Whether `candidate` is `host` itself or an ancestor domain of it, using
/// the same suffix logic as [`candidate_domains`]. Used by the Redirect
/// Engine to decide whether to preserve the cookie overlay across a
/// same-site host change.
pub fn is_same_or_ancestor(host: &str, candidate: &str) -> bool {
    let candidate = candidate.trim_start_matches('.');
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let candidate = candidate.trim_end_matches('.').to_ascii_lowercase();
    host == candidate || host.ends_with(&format!(".{candidate}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrable_domain_strips_subdomains() {
        assert_eq!(registrable_domain("a.b.example.com"), "example.com");
        assert_eq!(registrable_domain("example.com"), "example.com");
    }

    #[test]
    fn candidate_domains_includes_dot_prefixed_forms() {
        let candidates = candidate_domains("b.example.test");
        assert!(candidates.contains(&"b.example.test".to_string()));
        assert!(candidates.contains(&".b.example.test".to_string()));
        assert!(candidates.contains(&"example.test".to_string()));
        assert!(candidates.contains(&".example.test".to_string()));
    }

    #[test]
    fn same_or_ancestor_matches_subdomain() {
        assert!(is_same_or_ancestor("b.example.test", "example.test"));
        assert!(is_same_or_ancestor("b.example.test", ".example.test"));
        assert!(!is_same_or_ancestor("other.test", "example.test"));
    }
}
