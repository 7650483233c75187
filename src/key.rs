//! Defines key patterns, which map user ids to object keys and back.

use anyhow::{anyhow, Result};
use regex::Regex;

/// A key pattern with a single star (*) standing for a user id. The
/// star matches any number of non-slash characters.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    prefix: String,
    suffix: String,
    re: Regex,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut parts = pattern.split('*');
        let (prefix, suffix) = match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(suffix), None) => (prefix, suffix),
            _ => {
                return Err(anyhow!(
                    "key pattern {:?} must contain exactly one '*'",
                    pattern
                ))
            }
        };
        let re = Regex::new(&format!(
            "^{}([^/]+?){}$",
            regex::escape(prefix),
            regex::escape(suffix)
        ))?;
        Ok(KeyPattern {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            re,
        })
    }

    /// Extract the user id from a key, if the key matches.
    pub fn user_id<'k>(&self, key: &'k str) -> Option<&'k str> {
        self.re
            .captures(key)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Build the key for a user id.
    pub fn render(&self, user_id: &str) -> String {
        format!("{}{}{}", self.prefix, user_id, self.suffix)
    }

    pub fn is_match(&self, key: &str) -> bool {
        self.re.is_match(key)
    }

    /// Whether some key matches both this pattern and `other`.
    pub fn overlaps(&self, other: &KeyPattern) -> bool {
        // A shared key starts with the longer prefix and ends with the
        // longer suffix, with the ids filling in whatever is between.
        let head = match (&self.prefix, &other.prefix) {
            (a, b) if a.starts_with(b.as_str()) => a,
            (a, b) if b.starts_with(a.as_str()) => b,
            _ => return false,
        };
        let tail = match (&self.suffix, &other.suffix) {
            (a, b) if a.ends_with(b.as_str()) => a,
            (a, b) if b.ends_with(a.as_str()) => b,
            _ => return false,
        };
        let mut candidates = vec![format!("{}x{}", head, tail), format!("{}{}", head, tail)];
        for k in 1..=head.len().min(tail.len()) {
            if tail.is_char_boundary(k) && head.ends_with(&tail[..k]) {
                candidates.push(format!("{}{}", head, &tail[k..]));
            }
        }
        candidates
            .iter()
            .any(|key| self.is_match(key) && other.is_match(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_user_ids() {
        let pattern = KeyPattern::new("users/*.json").unwrap();
        assert_eq!(pattern.user_id("users/u1.json"), Some("u1"));
        assert_eq!(pattern.user_id("users/u1.json.bak"), None);
        assert_eq!(pattern.user_id("users/a/b.json"), None);
        assert_eq!(pattern.user_id("users/.json"), None);
        // The dot is literal.
        assert_eq!(pattern.user_id("users/u1xjson"), None);
    }

    #[test]
    fn renders_keys() {
        let pattern = KeyPattern::new("providers/*.json").unwrap();
        assert_eq!(pattern.render("u1"), "providers/u1.json");
        assert_eq!(pattern.user_id(&pattern.render("u1")), Some("u1"));
    }

    #[test]
    fn bare_star_matches_a_single_segment() {
        let pattern = KeyPattern::new("*").unwrap();
        assert_eq!(pattern.user_id("u1"), Some("u1"));
        assert_eq!(pattern.user_id("users/u1"), None);
    }

    #[test]
    fn overlap_needs_a_shared_key() {
        let pattern = |p: &str| KeyPattern::new(p).unwrap();
        assert!(!pattern("users/*.json").overlaps(&pattern("providers/*.json")));
        assert!(!pattern("*").overlaps(&pattern("p/*")));
        assert!(!pattern("users/*.json").overlaps(&pattern("users/*.txt")));
        assert!(pattern("*").overlaps(&pattern("*")));
        assert!(pattern("users/*.json").overlaps(&pattern("users/*")));
        assert!(pattern("users/*").overlaps(&pattern("users/*.json")));
    }

    #[test]
    fn overlap_across_different_prefixes() {
        let users = KeyPattern::new("data/x*").unwrap();
        let providers = KeyPattern::new("data/*").unwrap();
        assert!(users.overlaps(&providers));
        assert!(providers.overlaps(&users));
        assert_eq!(users.user_id(&providers.render("xa")), Some("a"));
    }

    #[test]
    fn overlap_where_prefix_and_suffix_meet() {
        // "ab.c" is "a" + "b" + ".c" and "ab" + "." + "c".
        let first = KeyPattern::new("a*.c").unwrap();
        let second = KeyPattern::new("ab*c").unwrap();
        assert!(first.overlaps(&second));
    }

    #[test]
    fn requires_exactly_one_star() {
        assert!(KeyPattern::new("users/u1.json").is_err());
        assert!(KeyPattern::new("users/*/*.json").is_err());
    }
}
