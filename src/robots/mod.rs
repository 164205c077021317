//! Robots Parser (spec §4.B): parse robots.txt, answer `can_fetch(ua, url)`,
//! expose crawl-delay/request-rate/sitemaps.
//!
//! Grounded in `original_source/pycurl_session/spider/robotstxtparser.py`'s
//! `RobotFileParser` (longest-substring user-agent match, `*`/`$` pattern
//! matching, percent-decode-except-`%2F` path normalization, 401/403 vs
//! other-4xx handling).

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    allow: bool,
}

#[derive(Debug, Clone, Default)]
struct AgentEntry {
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
    request_rate: Option<(u32, u32)>,
}

/// What `fetch_status` reported for the last `/robots.txt` attempt for this
/// host, driving the 401/403-disallow-all vs other-4xx-allow-all rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    Unauthorized,
    OtherClientError,
}

#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    agents: std::collections::HashMap<String, AgentEntry>,
    default: Option<AgentEntry>,
    sitemaps: Vec<String>,
    fetch_outcome: Option<FetchOutcome>,
}

const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

impl RobotsTxt {
    pub fn from_status(outcome: FetchOutcome) -> Self {
        Self { fetch_outcome: Some(outcome), ..Default::default() }
    }

    /// Parse raw robots.txt text. Comments (`#` to end-of-line) are stripped;
    /// line endings are normalized to `\n` by the caller reading the body as
    /// UTF-8 text.
    pub fn parse(text: &str) -> Self {
        let mut robots = RobotsTxt { fetch_outcome: Some(FetchOutcome::Fetched), ..Default::default() };
        let mut current_agents: Vec<String> = Vec::new();
        let mut in_block = false;

        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else { continue };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim().to_string();

            match field.as_str() {
                "user-agent" => {
                    if in_block {
                        current_agents.clear();
                        in_block = false;
                    }
                    current_agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_block = true;
                    if value.is_empty() && field == "disallow" {
                        // Empty Disallow means "allow everything" for this agent.
                        continue;
                    }
                    let rule = Rule { pattern: value, allow: field == "allow" };
                    for agent in &current_agents {
                        if agent == "*" {
                            robots.default.get_or_insert_with(AgentEntry::default).rules.push(rule.clone());
                        } else {
                            robots.agents.entry(agent.clone()).or_default().rules.push(rule.clone());
                        }
                    }
                }
                "crawl-delay" => {
                    in_block = true;
                    if let Ok(delay) = value.parse::<f64>() {
                        for agent in &current_agents {
                            entry_for(&mut robots, agent).crawl_delay = Some(delay);
                        }
                    }
                }
                "request-rate" => {
                    in_block = true;
                    if let Some((reqs, secs)) = value.split_once('/') {
                        if let (Ok(r), Ok(s)) = (reqs.parse(), secs.parse()) {
                            for agent in &current_agents {
                                entry_for(&mut robots, agent).request_rate = Some((r, s));
                            }
                        }
                    }
                }
                "sitemap" => robots.sitemaps.push(value),
                _ => {}
            }
        }

        robots
    }

    /// `can_fetch(ua, url)` per spec §4.B's five-step algorithm.
    pub fn can_fetch(&self, ua: &str, url: &str) -> bool {
        match self.fetch_outcome {
            Some(FetchOutcome::Unauthorized) => return false,
            Some(FetchOutcome::OtherClientError) => return true,
            _ => {}
        }

        let path = normalize_path(url);
        let entry = self.select_agent(ua);
        let Some(entry) = entry else { return true };

        for rule in &entry.rules {
            if pattern_matches(&rule.pattern, &path) {
                return rule.allow;
            }
        }
        true
    }

    pub fn crawl_delay(&self, ua: &str) -> Option<f64> {
        self.select_agent(ua).and_then(|e| e.crawl_delay)
    }

    pub fn request_rate(&self, ua: &str) -> Option<(u32, u32)> {
        self.select_agent(ua).and_then(|e| e.request_rate)
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Longest case-insensitive substring match of `ua` against declared
    /// user-agent tokens; falls back to the `*` default block.
    fn select_agent(&self, ua: &str) -> Option<&AgentEntry> {
        let ua_lower = ua.to_ascii_lowercase();
        let mut best: Option<(&String, &AgentEntry)> = None;
        for (token, entry) in &self.agents {
            if ua_lower.contains(token.as_str()) {
                let better = best.map(|(t, _)| token.len() > t.len()).unwrap_or(true);
                if better {
                    best = Some((token, entry));
                }
            }
        }
        best.map(|(_, e)| e).or(self.default.as_ref())
    }
}

fn entry_for<'a>(robots: &'a mut RobotsTxt, agent: &str) -> &'a mut AgentEntry {
    if agent == "*" {
        robots.default.get_or_insert_with(AgentEntry::default)
    } else {
        robots.agents.entry(agent.to_string()).or_default()
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Percent-decode the path except `%2F` (kept literal so an encoded slash
/// can't be used to bypass a path-segment rule), preserving query/fragment.
fn normalize_path(url: &str) -> String {
    let parsed = match url::Url::parse(url) {
        Ok(u) => u,
        Err(_) => return url.to_string(),
    };
    let mut path = parsed.path().to_string();
    if let Some(q) = parsed.query() {
        path.push('?');
        path.push_str(q);
    }

    // Decode everything except a literal "%2F"/"%2f".
    let placeholder = "\u{0}\u{0}SLASH\u{0}\u{0}";
    let protected = path.replace("%2F", placeholder).replace("%2f", placeholder);
    let decoded = percent_decode_str(&protected).decode_utf8_lossy().into_owned();
    decoded.replace(placeholder, "%2F")
}

/// A pattern may contain `*` (zero-or-more of any char) and a trailing `$`
/// (end anchor). Without wildcards, match is prefix.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    let (body, anchored) = match pattern.strip_suffix('$') {
        Some(b) => (b, true),
        None => (pattern, false),
    };

    if !body.contains('*') {
        return if anchored { path == body } else { path.starts_with(body) };
    }

    let segments: Vec<&str> = body.split('*').collect();
    let mut rest = path;

    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            continue;
        }
        match rest.find(seg) {
            Some(pos) if i == 0 => {
                if pos != 0 {
                    return false;
                }
                rest = &rest[pos + seg.len()..];
            }
            Some(pos) => {
                rest = &rest[pos + seg.len()..];
            }
            None => return false,
        }
    }

    if anchored {
        rest.is_empty()
    } else {
        true
    }
}

/// Percent-encode a single path segment with a configurable safe set,
/// exposed for the Preparer's "decode-then-encode" contract (spec §4.C
/// step 1) so both modules share one percent-encoding policy.
pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, FRAGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallow_private_blocks_matching_path() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /private/\n");
        assert!(!robots.can_fetch("anybot", "https://a.test/private/x"));
        assert!(robots.can_fetch("anybot", "https://a.test/public/x"));
    }

    #[test]
    fn wildcard_and_end_anchor_pattern() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /a*b$\n");
        assert!(!robots.can_fetch("anybot", "https://a.test/axxb"));
        assert!(robots.can_fetch("anybot", "https://a.test/axxb/"));
    }

    #[test]
    fn longest_user_agent_match_wins() {
        let robots = RobotsTxt::parse(
            "User-agent: *\nDisallow: /x\n\nUser-agent: Special-Bot\nAllow: /x\n",
        );
        assert!(robots.can_fetch("Special-Bot/1.0", "https://a.test/x"));
        assert!(!robots.can_fetch("generic-crawler", "https://a.test/x"));
    }

    #[test]
    fn unauthorized_fetch_disallows_all() {
        let robots = RobotsTxt::from_status(FetchOutcome::Unauthorized);
        assert!(!robots.can_fetch("anybot", "https://a.test/anything"));
    }

    #[test]
    fn other_client_error_allows_all() {
        let robots = RobotsTxt::from_status(FetchOutcome::OtherClientError);
        assert!(robots.can_fetch("anybot", "https://a.test/anything"));
    }

    #[test]
    fn crawl_delay_and_sitemaps_exposed() {
        let robots = RobotsTxt::parse(
            "User-agent: *\nCrawl-delay: 10\nSitemap: https://a.test/sitemap.xml\n",
        );
        assert_eq!(robots.crawl_delay("anybot"), Some(10.0));
        assert_eq!(robots.sitemaps(), &["https://a.test/sitemap.xml".to_string()]);
    }

    #[test]
    fn no_match_allows() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /private/\n");
        assert!(robots.can_fetch("anybot", "https://a.test/"));
    }
}
