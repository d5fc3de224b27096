//! Per-pool caller authorization: `policy` patterns support `*` (any caller)
//! and suffix wildcards (`prefix*`). No regex is needed — the grammar is a
//! strict subset.

pub fn matches(pattern: &str, identity: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => identity.starts_with(prefix),
        None => pattern == identity,
    }
}

/// An empty policy list means "no restriction beyond global authentication".
pub fn authorize(policy: &[String], identity: &str) -> bool {
    policy.is_empty() || policy.iter().any(|pattern| matches(pattern, identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_allows_everyone() {
        assert!(authorize(&[], "anyone"));
    }

    #[test]
    fn star_allows_everyone() {
        assert!(authorize(&["*".to_string()], "alice"));
    }

    #[test]
    fn exact_match_required_without_wildcard() {
        assert!(authorize(&["alice".to_string()], "alice"));
        assert!(!authorize(&["alice".to_string()], "bob"));
    }

    #[test]
    fn prefix_wildcard_matches_suffix_wildcard_form() {
        assert!(authorize(&["team-a-*".to_string()], "team-a-ci"));
        assert!(!authorize(&["team-a-*".to_string()], "team-b-ci"));
    }
}
