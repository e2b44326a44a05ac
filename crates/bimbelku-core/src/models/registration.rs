use chrono::NaiveDate;
use serde::Serialize;

use crate::api::FieldErrors;
use crate::models::Role;

/// Minimum password length accepted by the registration form.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration form. Serializes to the body `POST /auth/register/` expects.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    pub role: Role,
    #[serde(rename = "no_telp", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "tanggal_lahir", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "alamat", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl RegisterRequest {
    /// A request for an admin account; student profile fields are left empty.
    pub fn admin(username: &str, email: &str, password: &str, password2: &str) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            password2: password2.to_string(),
            role: Role::Admin,
            phone: None,
            birth_date: None,
            address: None,
        }
    }

    /// A request for a student account with its profile fields.
    pub fn siswa(
        username: &str,
        email: &str,
        password: &str,
        password2: &str,
        phone: &str,
        birth_date: Option<NaiveDate>,
        address: &str,
    ) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            password2: password2.to_string(),
            role: Role::Siswa,
            phone: Some(phone.to_string()),
            birth_date,
            address: Some(address.to_string()),
        }
    }

    /// Run the same checks the registration form runs before submitting.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.username.trim().is_empty() {
            errors.add("username", "Nama tidak boleh kosong");
        }

        if self.email.trim().is_empty() {
            errors.add("email", "Email tidak boleh kosong");
        } else if !is_plausible_email(self.email.trim()) {
            errors.add("email", "Format email tidak valid");
        }

        if self.password.is_empty() {
            errors.add("password", "Password tidak boleh kosong");
        } else if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add(
                "password",
                format!("Password minimal {} karakter", MIN_PASSWORD_LENGTH),
            );
        }

        if self.password != self.password2 {
            errors.add("password2", "Konfirmasi password tidak sama");
        }

        if self.role == Role::Siswa {
            if is_blank(self.phone.as_deref()) {
                errors.add("no_telp", "Nomor telepon tidak boleh kosong");
            }
            if self.birth_date.is_none() {
                errors.add("tanggal_lahir", "Tanggal lahir tidak boleh kosong");
            }
            if is_blank(self.address.as_deref()) {
                errors.add("alamat", "Alamat tidak boleh kosong");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The request as it goes on the wire: admins never send student fields.
    pub fn to_body(&self) -> Self {
        let mut body = self.clone();
        body.username = body.username.trim().to_string();
        body.email = body.email.trim().to_string();
        if body.role == Role::Admin {
            body.phone = None;
            body.birth_date = None;
            body.address = None;
        }
        body
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Loose `local@domain.tld` shape check; the server does the real validation.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    }
}
