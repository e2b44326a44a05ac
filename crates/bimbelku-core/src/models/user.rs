use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::routing::routes;

/// Role carried by the user profile. Authorization decisions read this and
/// nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Siswa,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Siswa => "siswa",
        }
    }

    /// The dashboard a user of this role lands on.
    pub fn dashboard_route(&self) -> &'static str {
        match self {
            Role::Admin => routes::ADMIN_DASHBOARD,
            Role::Siswa => routes::SISWA_DASHBOARD,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Siswa => "Siswa",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "siswa" => Ok(Role::Siswa),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "no_telp", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "tanggal_lahir", default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "alamat", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Profile fields that only exist for students.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudentProfile<'a> {
    pub phone: Option<&'a str>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<&'a str>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Student profile fields, or `None` for admins even if the server sent some.
    pub fn student_profile(&self) -> Option<StudentProfile<'_>> {
        match self.role {
            Role::Siswa => Some(StudentProfile {
                phone: self.phone.as_deref(),
                birth_date: self.birth_date,
                address: self.address.as_deref(),
            }),
            Role::Admin => None,
        }
    }
}
