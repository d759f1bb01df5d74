//! Role-based access control.
//!
//! Callers present `Authorization: Bearer <token>`; each configured token maps
//! to one role, and each route requires one permission. When no tokens are
//! configured the middleware lets everything through.

use std::collections::HashMap;
use std::fmt;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::error::AppError;
use crate::http::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Surgeon,
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewSchedule,
    ManageSurgeries,
    ManageTheatres,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "surgeon" => Some(Role::Surgeon),
            "staff" => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Surgeon => "surgeon",
            Role::Staff => "staff",
        }
    }

    pub fn allows(self, permission: Permission) -> bool {
        match self {
            Role::Admin => true,
            Role::Surgeon => matches!(permission, Permission::ViewSchedule | Permission::ManageSurgeries),
            Role::Staff => permission == Permission::ViewSchedule,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static bearer tokens, parsed from `role:token,role:token`.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Role>,
}

impl TokenTable {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut tokens = HashMap::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (role, token) = pair
                .split_once(':')
                .ok_or_else(|| format!("expected role:token, got {pair:?}"))?;
            let role = Role::parse(role).ok_or_else(|| format!("unknown role {role:?}"))?;
            let token = token.trim();
            if token.is_empty() {
                return Err(format!("empty token for role {role}"));
            }
            if tokens.insert(token.to_string(), role).is_some() {
                return Err(format!("token listed twice (role {role})"));
            }
        }
        Ok(Self { tokens })
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn role_for(&self, token: &str) -> Option<Role> {
        self.tokens.get(token).copied()
    }
}

/// Method + path prefix → permission. First match wins.
const ROUTE_PERMISSIONS: &[(&str, &str, Permission)] = &[
    ("GET", "/api/", Permission::ViewSchedule),
    ("POST", "/api/theatre", Permission::ManageTheatres),
    ("PUT", "/api/theatre", Permission::ManageTheatres),
    ("POST", "/api/surgeries", Permission::ManageSurgeries),
    ("PUT", "/api/surgeries", Permission::ManageSurgeries),
    ("DELETE", "/api/surgeries", Permission::ManageSurgeries),
];

fn prefix_matches(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Permission needed for a request. `None` means the route is public;
/// anything else under `/api` needs the strongest permission.
pub fn required_permission(method: &Method, path: &str) -> Option<Permission> {
    if !prefix_matches(path, "/api") {
        return None;
    }
    let found = ROUTE_PERMISSIONS
        .iter()
        .find(|(m, prefix, _)| *m == method.as_str() && prefix_matches(path, prefix))
        .map(|(_, _, p)| *p);
    Some(found.unwrap_or(Permission::ManageTheatres))
}

/// Token from `Authorization: Bearer <token>`. The scheme is matched
/// case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Reject requests whose token is missing (401) or whose role lacks the
/// route's permission (403).
pub async fn authorize(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.tokens.is_empty() {
        return Ok(next.run(req).await);
    }
    let Some(permission) = required_permission(req.method(), req.uri().path()) else {
        return Ok(next.run(req).await);
    };

    let role = bearer_token(req.headers())
        .and_then(|t| state.tokens.role_for(t))
        .ok_or(AppError::Unauthorized)?;
    if !role.allows(permission) {
        tracing::debug!(%role, ?permission, path = req.uri().path(), "forbidden");
        return Err(AppError::Forbidden(role));
    }
    Ok(next.run(req).await)
}
