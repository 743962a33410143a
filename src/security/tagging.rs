//! Request tags consumed by the post-response hooks.

use axum::http::Method;

/// Route prefixes treated as authentication endpoints.
const AUTH_PREFIXES: &[&str] = &["/api/auth/"];
/// Auth endpoints that accept credentials.
const CREDENTIAL_ROUTES: &[&str] = &[
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/refresh",
    "/api/auth/reset-password",
];
const ADMIN_PREFIXES: &[&str] = &["/api/admin"];

/// Observations attached to a request. Never used to reject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityTags {
    pub auth_route: bool,
    pub admin_route: bool,
    pub brute_force_candidate: bool,
}

impl SecurityTags {
    /// Route-shape tags.
    pub fn for_route(path: &str) -> Self {
        Self {
            auth_route: AUTH_PREFIXES.iter().any(|p| path.starts_with(p)),
            admin_route: ADMIN_PREFIXES
                .iter()
                .any(|p| path == *p || path.starts_with(&format!("{p}/"))),
            brute_force_candidate: false,
        }
    }

    /// Mark credential submissions on auth routes.
    pub fn mark_brute_force(&mut self, method: &Method, path: &str) {
        self.brute_force_candidate = *method == Method::POST && CREDENTIAL_ROUTES.contains(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_tags() {
        let tags = SecurityTags::for_route("/api/auth/login");
        assert!(tags.auth_route);
        assert!(!tags.admin_route);

        assert!(SecurityTags::for_route("/api/admin/orders").admin_route);
        assert!(SecurityTags::for_route("/api/admin").admin_route);
        assert!(!SecurityTags::for_route("/api/administrators").admin_route);
    }

    #[test]
    fn test_brute_force_only_for_credential_posts() {
        let mut tags = SecurityTags::for_route("/api/auth/login");
        tags.mark_brute_force(&Method::POST, "/api/auth/login");
        assert!(tags.brute_force_candidate);

        tags.mark_brute_force(&Method::GET, "/api/auth/login");
        assert!(!tags.brute_force_candidate);

        let mut me = SecurityTags::for_route("/api/auth/me");
        me.mark_brute_force(&Method::POST, "/api/auth/me");
        assert!(!me.brute_force_candidate);
    }
}
