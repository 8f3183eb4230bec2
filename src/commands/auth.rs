//! Authentication command handlers for the OAuth flow.
//!
//! This module implements the CLI commands for:
//! - `receipts auth` - Initial OAuth consent flow
//! - `receipts auth --verify` - Verify and refresh authentication

use crate::api::TokenProvider;
use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;

/// Handles the `receipts auth` command - runs the OAuth consent flow.
///
/// This is the ONLY command that should send the user to a browser for OAuth authentication.
///
/// This guides the user through setting up Google authentication:
/// 1. Checks for client_secret.json (fails with instructions if missing)
/// 2. Prints the consent URL and waits for the redirect
/// 3. Saves tokens to token.json with the required scopes
///
/// # Errors
/// Returns an error if the OAuth flow fails or if client_secret.json is missing
pub async fn auth(config: &Config) -> Result<Out<()>> {
    let _ = TokenProvider::initialize(config.client_secret_path(), config.token_path()).await?;
    Ok("Authorization complete, tokens are saved".into())
}

/// Handles the `receipts auth --verify` command - verifies authentication.
///
/// This command NEVER opens a browser or triggers an interactive OAuth flow. It only verifies
/// that existing cached tokens are valid, refreshing them silently if needed.
///
/// If the token is missing, invalid, or has the wrong scopes, this command will fail with an
/// error message telling the user to run `receipts auth`.
///
/// # Errors
/// Returns an error if verification fails, credentials are missing, or tokens are invalid.
pub async fn auth_verify(config: &Config) -> Result<Out<()>> {
    let mut token_provider = TokenProvider::load(config.client_secret_path(), config.token_path())
        .await
        .context(
            "Unable to use the existing tokens found in the token JSON file. \n\n\
            You should run 'receipts auth' (without the --verify flag).",
        )?;
    token_provider
        .refresh()
        .await
        .context("Unable to refresh the token")?;
    Ok("Your OAuth token is valid!".into())
}
