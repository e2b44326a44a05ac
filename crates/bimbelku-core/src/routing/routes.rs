//! Route paths.

pub const ROOT: &str = "/";
pub const LOGIN: &str = "/login";
pub const REGISTER: &str = "/register";
pub const ADMIN_DASHBOARD: &str = "/admin-dashboard";
pub const SISWA_DASHBOARD: &str = "/siswa-dashboard";
pub const CREATE_BIMBEL: &str = "/create-bimbel";

/// Routes reachable without a session.
pub const PUBLIC_ROUTES: [&str; 2] = [LOGIN, REGISTER];

/// Strip query string, fragment and trailing slash so `/login/?next=x`
/// and `/login` are the same route.
pub fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default().trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
