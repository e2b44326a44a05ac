use std::collections::{HashMap, HashSet};

use super::routes::{self, normalize};
use crate::models::Role;

/// Which routes are public and which roles may view the rest.
///
/// A non-public route without an entry is open to any authenticated role.
#[derive(Debug, Clone)]
pub struct RouteTable {
    public: HashSet<String>,
    roles: HashMap<String, Vec<Role>>,
}

impl RouteTable {
    /// A table with no public routes and no role rules.
    pub fn empty() -> Self {
        Self {
            public: HashSet::new(),
            roles: HashMap::new(),
        }
    }

    pub fn with_public(mut self, path: &str) -> Self {
        self.public.insert(normalize(path));
        self
    }

    pub fn with_rule(mut self, path: &str, roles: &[Role]) -> Self {
        self.roles.insert(normalize(path), roles.to_vec());
        self
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.contains(&normalize(path))
    }

    /// Roles permitted on `path`, or `None` when any authenticated role is.
    pub fn allowed_roles(&self, path: &str) -> Option<&[Role]> {
        self.roles.get(&normalize(path)).map(Vec::as_slice)
    }

    pub fn permits(&self, path: &str, role: Role) -> bool {
        self.allowed_roles(path)
            .map(|roles| roles.contains(&role))
            .unwrap_or(true)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        let mut table = Self::empty()
            .with_rule(routes::ADMIN_DASHBOARD, &[Role::Admin])
            .with_rule(routes::SISWA_DASHBOARD, &[Role::Siswa])
            .with_rule(routes::CREATE_BIMBEL, &[Role::Admin]);
        for path in routes::PUBLIC_ROUTES {
            table = table.with_public(path);
        }
        table
    }
}
