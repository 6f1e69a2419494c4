//! Cache of parsed `WWW-Authenticate` challenges, keyed by authority

use moka::sync::Cache;
use std::collections::HashMap;
use std::fmt;

/// Challenge parameter name→value map
pub type ChallengeParams = HashMap<String, String>;

/// Challenge parameters keyed by lower-cased authority
///
/// An absent entry means no challenge has been seen yet; it is not an error.
#[derive(Clone)]
pub struct ChallengeCache {
    challenges: Cache<String, ChallengeParams>,
}

impl ChallengeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            challenges: Cache::builder().build(),
        }
    }

    /// Cached challenge for `authority`
    pub fn get(&self, authority: &str) -> Option<ChallengeParams> {
        if authority.is_empty() {
            return None;
        }
        self.challenges.get(&normalize(authority))
    }

    /// Record the challenge for `authority`, replacing any earlier one
    ///
    /// An empty authority or absent parameters are ignored. An empty parameter map
    /// is stored: a bare `Bearer` challenge is still a challenge.
    pub fn put(&self, authority: &str, params: Option<ChallengeParams>) {
        let Some(params) = params else {
            return;
        };
        if authority.is_empty() {
            return;
        }
        self.challenges.insert(normalize(authority), params);
    }
}

impl Default for ChallengeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChallengeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeCache")
            .field("entries", &self.challenges.entry_count())
            .finish()
    }
}

fn normalize(authority: &str) -> String {
    authority.to_lowercase()
}

/// Parse a `WWW-Authenticate` header value
///
/// Returns the scheme and its parameters, e.g. `Bearer authorization="https://..."`
/// yields `("Bearer", {"authorization": "https://..."})`. Parameter names are
/// lower-cased; quoted values may contain commas.
pub fn parse_challenge(header: &str) -> Option<(String, ChallengeParams)> {
    let header = header.trim();
    let (scheme, rest) = match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) => (scheme, rest),
        None => (header, ""),
    };
    if scheme.is_empty() || scheme.contains('=') {
        return None;
    }

    let mut params = ChallengeParams::new();
    for part in split_unquoted(rest) {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches('"').to_string();
        let _ = params.insert(name, value);
    }

    Some((scheme.to_string(), params))
}

fn split_unquoted(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}
