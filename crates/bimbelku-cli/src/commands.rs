//! Subcommand implementations.

use std::io::{self, Write};

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::warn;

use bimbelku_core::api::Method;
use bimbelku_core::models::RegisterRequest;
use bimbelku_core::routing::routes::LOGIN;
use bimbelku_core::routing::{EntryReason, Navigation, RedirectReason};
use bimbelku_core::{ApiError, BimbelClient, Config, Role, SessionEvent, User};

pub async fn login(client: &BimbelClient, email: Option<String>) -> Result<()> {
    if let Some(user) = client.store.user() {
        println!("Already logged in as {} <{}>", user.username, user.email);
        let mut navigator = client.navigator();
        print_navigation(&navigator.navigate(LOGIN));
        return Ok(());
    }

    let email = match email.or_else(|| client.config().last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    let user = client.auth.login(&email, &password).await.map_err(report)?;
    remember_email(&user);

    println!("Welcome, {} ({})", user.username, user.role.display_name());
    let mut navigator = client.navigator();
    print_navigation(&navigator.after_login(&user));
    Ok(())
}

pub async fn register(client: &BimbelClient, role: Role) -> Result<()> {
    let username = prompt("Username: ")?;
    let email = prompt("Email: ")?;
    let password = rpassword::prompt_password("Password: ")?;
    let password2 = rpassword::prompt_password("Confirm password: ")?;

    let request = match role {
        Role::Admin => RegisterRequest::admin(&username, &email, &password, &password2),
        Role::Siswa => {
            let phone = prompt("Phone number: ")?;
            let birth_date = prompt("Birth date (YYYY-MM-DD): ")?;
            let address = prompt("Address: ")?;
            RegisterRequest::siswa(
                &username,
                &email,
                &password,
                &password2,
                &phone,
                parse_date(&birth_date),
                &address,
            )
        }
    };

    let user = client.auth.register(&request).await.map_err(report)?;
    remember_email(&user);

    println!("Account created for {} ({})", user.username, user.role.display_name());
    let mut navigator = client.navigator();
    print_navigation(&navigator.after_login(&user));
    Ok(())
}

pub fn logout(client: &BimbelClient) -> Result<()> {
    client.auth.logout();
    println!("Logged out");
    Ok(())
}

pub fn status(client: &BimbelClient) -> Result<()> {
    match client.store.get() {
        Some(session) => {
            let user = &session.user;
            println!("Logged in as {} <{}>", user.username, user.email);
            println!("Role: {}", user.role.display_name());
            if let Some(profile) = user.student_profile() {
                if let Some(phone) = profile.phone {
                    println!("Phone: {}", phone);
                }
                if let Some(birth_date) = profile.birth_date {
                    println!("Birth date: {}", birth_date.format("%d %B %Y"));
                }
                if let Some(address) = profile.address {
                    println!("Address: {}", address);
                }
            }
            if session.refresh_token.is_none() {
                println!("No refresh token stored; the session ends when the access token expires");
            }
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

pub async fn start(client: &BimbelClient) -> Result<()> {
    let mut events = client.store.subscribe();
    let decision = client.entry.resolve().await;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Cleared(reason) = event {
            if reason.is_forced() {
                println!("Your stored session is no longer valid. Please log in again.");
            }
        }
    }

    if let EntryReason::Unreachable(message) = &decision.reason {
        // Show the login page as is; the kept session would bounce past it
        eprintln!("{}", ApiError::Network(message.clone()).user_message());
        println!("Now at {}", decision.destination);
        return Ok(());
    }

    let mut navigator = client.navigator();
    print_navigation(&navigator.navigate(&decision.destination));
    Ok(())
}

pub fn open(client: &BimbelClient, path: &str) -> Result<()> {
    let mut navigator = client.navigator();
    print_navigation(&navigator.navigate(path));
    Ok(())
}

pub async fn profile(client: &BimbelClient) -> Result<()> {
    let user = client.auth.profile().await.map_err(report)?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

pub async fn request(
    client: &BimbelClient,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<()> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| anyhow!("Invalid HTTP method: {}", method))?;
    let body: Option<Value> = body.map(serde_json::from_str).transpose()?;

    let response = client.gateway.send(method, path, body).await.map_err(report)?;
    match serde_json::from_str::<Value>(&response.body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", response.body),
    }
    Ok(())
}

/// Print the user-facing message for `error` and turn it into an exit error.
fn report(error: ApiError) -> anyhow::Error {
    if let Some(fields) = error.field_errors() {
        for (field, messages) in fields.iter() {
            eprintln!("  {}: {}", field, messages.join(", "));
        }
    }
    eprintln!("{}", error.user_message());
    if error.requires_login() {
        eprintln!("Redirecting to /login");
    }
    anyhow!(error)
}

fn print_navigation(navigation: &Navigation) {
    for (to, reason) in &navigation.redirects {
        match reason {
            RedirectReason::Unauthenticated => println!("Not logged in, redirecting to {}", to),
            RedirectReason::RoleMismatch { role } => {
                println!("Not available to {}, redirecting to {}", role.display_name(), to)
            }
            RedirectReason::AlreadyAuthenticated { .. } => {
                println!("Already logged in, redirecting to {}", to)
            }
        }
    }
    println!("Now at {}", navigation.landed);
}

fn remember_email(user: &User) {
    if let Err(e) = Config::save_last_email(&user.email) {
        warn!(error = %e, "Failed to save config");
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        bail!("Input closed");
    }
    Ok(line.trim().to_string())
}

/// Blank or unparseable input leaves the date unset so form validation
/// reports it next to the other fields.
fn parse_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").ok()
}
