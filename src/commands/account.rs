//! Account command handlers: login, register, logout, whoami.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::commands::Context;
use crate::error::Result;
use crate::session::claims::decode_claims;
use crate::session::{Role, Session, UserIdentity};

/// Log in and print who the session belongs to.
pub async fn login(ctx: &Context, username: &str, password: &str) -> Result<()> {
    let session = ctx.accounts().login(username, password).await?;
    println!(
        "{}",
        format!("Logged in as {} ({})", session.user.username, session.role()).green()
    );
    Ok(())
}

/// Register an account and print who the session belongs to.
pub async fn register(ctx: &Context, username: &str, email: &str, password: &str) -> Result<()> {
    let session = ctx.accounts().register(username, email, password).await?;
    println!(
        "{}",
        format!("Registered and logged in as {}", session.user.username).green()
    );
    Ok(())
}

/// Forget the stored session.
pub fn logout(ctx: &Context) -> Result<()> {
    let was_authenticated = ctx.store.is_authenticated();
    ctx.accounts().logout()?;
    if was_authenticated {
        println!("{}", "Logged out".green());
    } else {
        println!("{}", "Not logged in".yellow());
    }
    Ok(())
}

/// What `whoami` reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhoamiReport {
    /// Whether a session is stored
    pub authenticated: bool,
    /// Identity of the session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
    /// Expiry of the current access token, when it is a JWT carrying `exp`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<DateTime<Utc>>,
}

impl WhoamiReport {
    /// Builds the report for `session`.
    pub fn from_session(session: Option<&Session>) -> Self {
        match session {
            None => Self {
                authenticated: false,
                user: None,
                access_token_expires_at: None,
            },
            Some(s) => Self {
                authenticated: true,
                user: Some(s.user.clone()),
                access_token_expires_at: decode_claims(&s.tokens.access)
                    .and_then(|c| c.expires_at()),
            },
        }
    }
}

/// Print the logged-in user.
pub fn whoami(ctx: &Context, json: bool) -> Result<()> {
    let session = ctx.store.snapshot();
    let report = WhoamiReport::from_session(session.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let Some(user) = report.user else {
        println!("{}", "Not logged in".yellow());
        println!("Use {} to sign in.", "roomkey login -u <USERNAME>".cyan());
        return Ok(());
    };

    let role = match user.role {
        Role::Admin => user.role.to_string().magenta(),
        _ => user.role.to_string().normal(),
    };

    println!("\nCurrent Session\n");
    println!("Username:       {}", user.username.bold());
    println!("User ID:        {}", user.id);
    if !user.email.is_empty() {
        println!("Email:          {}", user.email);
    }
    println!("Role:           {}", role);
    if let Some(expires) = report.access_token_expires_at {
        let note = if expires <= Utc::now() {
            " (expired; refreshed on next request)".yellow()
        } else {
            "".normal()
        };
        println!(
            "Token expires:  {}{}",
            expires.format("%Y-%m-%d %H:%M:%S UTC"),
            note
        );
    }
    println!();
    Ok(())
}
