use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(SessionError::RoleUnresolvable(Some(other.to_string()))),
        }
    }
}

/// Landing area of each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    AdminDashboard,
    UserDashboard,
}

impl Destination {
    pub fn path(&self) -> &'static str {
        match self {
            Destination::AdminDashboard => "/admin/dashboard",
            Destination::UserDashboard => "/user/dashboard",
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Destination::AdminDashboard => Role::Admin,
            Destination::UserDashboard => Role::User,
        }
    }
}

/// Who may enter a navigation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    /// Any authenticated session.
    Authenticated,
    Restricted(Role),
}

const PUBLIC_ROUTES: &[&str] = &["/", "/login", "/signup"];

/// Classify a navigation target path. Query string and trailing slash are ignored.
pub fn route_access(target: &str) -> RouteAccess {
    let path = target.split(['?', '#']).next().unwrap_or("");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };

    if PUBLIC_ROUTES.contains(&path) {
        return RouteAccess::Public;
    }
    if path == "/admin" || path.starts_with("/admin/") {
        RouteAccess::Restricted(Role::Admin)
    } else if path == "/user" || path.starts_with("/user/") {
        RouteAccess::Restricted(Role::User)
    } else {
        RouteAccess::Authenticated
    }
}

/// Map a stored role to its landing area. Unknown or missing roles never get a default.
pub fn route_for_role(role: Option<&str>) -> Result<Destination, SessionError> {
    let role = role.ok_or(SessionError::RoleUnresolvable(None))?;
    Ok(match role.parse::<Role>()? {
        Role::Admin => Destination::AdminDashboard,
        Role::User => Destination::UserDashboard,
    })
}

/// Cross-role check: a restricted area is only open to its own role.
pub fn role_admits(access: RouteAccess, role: Role) -> bool {
    match access {
        RouteAccess::Public | RouteAccess::Authenticated => true,
        RouteAccess::Restricted(required) => required == role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_roles_route_to_their_dashboards() {
        assert_eq!(route_for_role(Some("admin")).unwrap(), Destination::AdminDashboard);
        assert_eq!(route_for_role(Some("user")).unwrap(), Destination::UserDashboard);
        assert_eq!(Destination::AdminDashboard.path(), "/admin/dashboard");
    }

    #[test]
    fn unknown_or_missing_role_is_unresolvable() {
        assert_eq!(route_for_role(None), Err(SessionError::RoleUnresolvable(None)));
        assert_eq!(
            route_for_role(Some("manager")),
            Err(SessionError::RoleUnresolvable(Some("manager".into())))
        );
        // role names are case sensitive, as stored by the backend
        assert!(route_for_role(Some("Admin")).is_err());
        assert!(route_for_role(Some("")).is_err());
    }

    #[test]
    fn route_access_classifies_paths() {
        assert_eq!(route_access("/"), RouteAccess::Public);
        assert_eq!(route_access(""), RouteAccess::Public);
        assert_eq!(route_access("/login?sessionExpired=true"), RouteAccess::Public);
        assert_eq!(route_access("/signup/"), RouteAccess::Public);
        assert_eq!(route_access("/admin/dashboard"), RouteAccess::Restricted(Role::Admin));
        assert_eq!(route_access("/admin"), RouteAccess::Restricted(Role::Admin));
        assert_eq!(route_access("/user/works/3"), RouteAccess::Restricted(Role::User));
        assert_eq!(route_access("/administrator"), RouteAccess::Authenticated);
        assert_eq!(route_access("/profile"), RouteAccess::Authenticated);
    }

    #[test]
    fn cross_role_access_is_refused() {
        let admin_area = route_access("/admin/teams");
        assert!(role_admits(admin_area, Role::Admin));
        assert!(!role_admits(admin_area, Role::User));
        assert!(role_admits(RouteAccess::Authenticated, Role::User));
    }
}
