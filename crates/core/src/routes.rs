//! Route gate rules.
//!
//! Two independent rule sets decide where a navigation may go:
//! protected paths need a session, and sign-in pages bounce users who
//! already have one. Matching is by path segment, so `/account` covers
//! `/account/orders` but not `/account_confirmation_check_email`.

/// Outcome of checking a path against the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Let the request through.
    Allow,
    /// Send the client to this path instead.
    Redirect(String),
}

/// Route gate configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRules {
    /// Paths that require a session.
    pub protected: Vec<String>,
    /// Paths that signed-in users are bounced away from.
    pub redirect_if_authenticated: Vec<String>,
    /// Where anonymous users are sent.
    pub login_path: String,
    /// Where signed-in users are sent.
    pub landing_path: String,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            protected: ["/dashboard", "/checkout", "/account", "/profile"]
                .map(str::to_owned)
                .to_vec(),
            redirect_if_authenticated: ["/login", "/register"].map(str::to_owned).to_vec(),
            login_path: "/login".to_owned(),
            landing_path: "/dashboard".to_owned(),
        }
    }
}

impl RouteRules {
    /// Whether `path` needs a session.
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|prefix| matches_prefix(path, prefix))
    }

    /// Whether signed-in users are bounced away from `path`.
    #[must_use]
    pub fn redirects_when_authenticated(&self, path: &str) -> bool {
        self.redirect_if_authenticated
            .iter()
            .any(|prefix| matches_prefix(path, prefix))
    }

    /// Whether either rule set covers `path`. Requests that don't match can
    /// skip the session lookup entirely.
    #[must_use]
    pub fn applies(&self, path: &str) -> bool {
        self.is_protected(path) || self.redirects_when_authenticated(path)
    }

    /// Decide what to do with a navigation to `path`.
    #[must_use]
    pub fn decide(&self, path: &str, has_session: bool) -> GateDecision {
        if !has_session && self.is_protected(path) {
            return GateDecision::Redirect(self.login_path.clone());
        }

        if has_session && self.redirects_when_authenticated(path) {
            return GateDecision::Redirect(self.landing_path.clone());
        }

        GateDecision::Allow
    }
}

/// Segment-aware prefix match: `prefix` itself, or `prefix` followed by `/`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }

    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_without_session_goes_to_login() {
        let rules = RouteRules::default();
        assert_eq!(
            rules.decide("/dashboard", false),
            GateDecision::Redirect("/login".to_owned())
        );
        assert_eq!(
            rules.decide("/checkout", false),
            GateDecision::Redirect("/login".to_owned())
        );
    }

    #[test]
    fn test_protected_with_session_allowed() {
        let rules = RouteRules::default();
        assert_eq!(rules.decide("/dashboard", true), GateDecision::Allow);
        assert_eq!(rules.decide("/profile/settings", true), GateDecision::Allow);
    }

    #[test]
    fn test_login_with_session_goes_to_landing() {
        let rules = RouteRules::default();
        assert_eq!(
            rules.decide("/login", true),
            GateDecision::Redirect("/dashboard".to_owned())
        );
        assert_eq!(
            rules.decide("/register", true),
            GateDecision::Redirect("/dashboard".to_owned())
        );
        assert_eq!(rules.decide("/login", false), GateDecision::Allow);
    }

    #[test]
    fn test_unmatched_paths_pass() {
        let rules = RouteRules::default();
        for path in ["/", "/products", "/cart", "/success"] {
            assert!(!rules.applies(path));
            assert_eq!(rules.decide(path, false), GateDecision::Allow);
            assert_eq!(rules.decide(path, true), GateDecision::Allow);
        }
    }

    #[test]
    fn test_matching_is_segment_aware() {
        let rules = RouteRules::default();
        assert!(rules.is_protected("/account"));
        assert!(rules.is_protected("/account/orders"));
        assert!(!rules.is_protected("/account_confirmation_check_email"));
        assert!(!rules.redirects_when_authenticated("/loginhelp"));
    }

    #[test]
    fn test_rule_sets_are_independent() {
        let rules = RouteRules {
            protected: vec!["/both".to_owned()],
            redirect_if_authenticated: vec!["/both".to_owned()],
            ..RouteRules::default()
        };
        assert_eq!(
            rules.decide("/both", false),
            GateDecision::Redirect("/login".to_owned())
        );
        assert_eq!(
            rules.decide("/both", true),
            GateDecision::Redirect("/dashboard".to_owned())
        );
    }
}
