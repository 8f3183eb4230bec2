//! OAuth 2.0 authentication flow implementation for the Google Sheets and Drive APIs.
//!
//! This module handles the complete OAuth workflow including:
//! - Loading OAuth credentials from client_secret.json
//! - Managing access and refresh tokens in token.json
//! - Running the OAuth consent flow with a local callback server
//! - Automatic token refresh when expired

use crate::api::files::{File, SecretFile, TokenFile};
use crate::api::OAUTH_SCOPES;
use crate::Result;
use anyhow::{bail, Context};
use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// The local port on which we listen for the OAuth redirect.
const OAUTH_CALLBACK_PORT: u16 = 3030;

/// When no expiry comes back with a token, assume this lifetime.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// An oauth2 client with its auth and token endpoints configured.
type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Holds the OAuth client credentials and the current token, refreshing and persisting the token
/// as needed. The Google clients call `token_with_refresh` before each batch of API calls.
pub(crate) struct TokenProvider {
    secret: SecretFile,
    token: File<TokenFile>,
}

impl TokenProvider {
    /// Loads existing credentials and tokens from disk. This never opens a browser; when the token
    /// file is missing or lacks the required scopes the user is told to run `receipts auth`.
    pub(crate) async fn load(
        secret_path: impl AsRef<Path>,
        token_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let secret = SecretFile::load(secret_path.as_ref()).await?;
        let token = File::<TokenFile>::load(token_path.as_ref())
            .await
            .context("Unable to load the OAuth token file, run 'receipts auth' to create it")?;
        token.data().validate_scopes()?;
        Ok(Self { secret, token })
    }

    /// Runs the complete OAuth consent flow.
    ///
    /// This function:
    /// 1. Loads OAuth credentials from client_secret.json
    /// 2. Starts a local HTTP server on localhost:3030
    /// 3. Prints the Google consent URL for the user to open
    /// 4. Waits for the OAuth callback with the authorization code
    /// 5. Exchanges the code for access and refresh tokens
    /// 6. Saves tokens to token.json
    pub(crate) async fn initialize(
        secret_path: impl AsRef<Path>,
        token_path: impl AsRef<Path>,
    ) -> Result<Self> {
        info!("Starting OAuth consent flow");
        let secret = SecretFile::load(secret_path.as_ref()).await?;
        let client = oauth_client(&secret)?;

        let (auth_url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(OAUTH_SCOPES.iter().map(|s| Scope::new(s.to_string())))
            // Google only issues a refresh token for offline access with forced consent.
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        info!("Open this URL in your browser to authorize access:");
        info!("{auth_url}");
        info!("Local callback server listening on http://localhost:{OAUTH_CALLBACK_PORT}");

        let (code, state) = receive_callback(OAUTH_CALLBACK_PORT).await?;
        if state != *csrf.secret() {
            bail!("The OAuth state parameter did not match, aborting the consent flow");
        }

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(&http_client()?)
            .await
            .context("Failed to exchange the authorization code for tokens")?;

        let scopes = response
            .scopes()
            .map(|s| s.iter().map(|scope| scope.to_string()).collect())
            .unwrap_or_else(|| OAUTH_SCOPES.iter().map(|s| s.to_string()).collect());
        let refresh_token = response
            .refresh_token()
            .map(|r| r.secret().to_string())
            .unwrap_or_default();
        let token_file = TokenFile::new(
            scopes,
            response.access_token().secret().to_string(),
            refresh_token,
            expires_at(response.expires_in()),
            None,
        );
        token_file.validate_scopes()?;

        let token = File::new(token_path.as_ref(), token_file);
        token.save().await?;
        info!("Authorization successful!");
        info!("Tokens saved to: {}", token_path.as_ref().display());

        Ok(Self { secret, token })
    }

    /// Refreshes the access token using the stored refresh token and persists the result. This
    /// never opens a browser.
    pub(crate) async fn refresh(&mut self) -> Result<()> {
        let refresh_token = self.token.data().refresh_token().to_string();
        if refresh_token.is_empty() {
            bail!("No refresh token is available, run 'receipts auth' to authorize again");
        }
        let client = oauth_client(&self.secret)?;
        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&http_client()?)
            .await
            .context("Failed to refresh the access token")?;

        self.token.data_mut().update(
            response.access_token().secret().to_string(),
            expires_at(response.expires_in()),
            response.refresh_token().map(|r| r.secret().to_string()),
        );
        self.token.save().await?;
        debug!("Access token refreshed");
        Ok(())
    }

    /// Returns a valid access token, refreshing first when the stored one is at or near expiry.
    pub(crate) async fn token_with_refresh(&mut self) -> Result<&str> {
        if self.token.data().is_expired() {
            debug!("Access token is expired or expiring soon, refreshing");
            self.refresh().await?;
        }
        Ok(self.token.data().access_token())
    }

    /// Returns the current access token without checking expiry.
    pub(crate) fn token(&self) -> &str {
        self.token.data().access_token()
    }
}

/// Builds the oauth2 client from the installed-application credentials.
fn oauth_client(secret: &SecretFile) -> Result<ConfiguredClient> {
    let client = BasicClient::new(ClientId::new(secret.client_id().to_string()))
        .set_client_secret(ClientSecret::new(secret.client_secret().to_string()))
        .set_auth_uri(
            AuthUrl::new(secret.auth_uri().to_string()).context("Invalid auth_uri in secrets")?,
        )
        .set_token_uri(
            TokenUrl::new(secret.token_uri().to_string()).context("Invalid token_uri in secrets")?,
        )
        .set_redirect_uri(
            RedirectUrl::new(format!("http://localhost:{OAUTH_CALLBACK_PORT}"))
                .context("Invalid redirect URL")?,
        );
    Ok(client)
}

/// The HTTP client used for token exchanges. Redirects must stay disabled when talking to the
/// token endpoint.
fn http_client() -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Failed to build the OAuth HTTP client")
}

fn expires_at(expires_in: Option<std::time::Duration>) -> chrono::DateTime<Utc> {
    let secs = expires_in
        .map(|d| d.as_secs() as i64)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Utc::now() + chrono::Duration::seconds(secs)
}

/// Serves connections on the callback port until Google redirects the user's browser back to us
/// with `code` and `state` query parameters. Stray requests (e.g. favicon) get a holding page.
async fn receive_callback(port: u16) -> Result<(String, String)> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Unable to bind the OAuth callback server to port {port}"))?;

    let captured: Arc<Mutex<Option<(String, String)>>> = Arc::new(Mutex::new(None));
    loop {
        let (stream, _) = listener
            .accept()
            .await
            .context("Failed to accept a connection on the OAuth callback port")?;
        let io = TokioIo::new(stream);
        let captured_for_conn = Arc::clone(&captured);
        let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
            let captured = Arc::clone(&captured_for_conn);
            async move {
                let body = match parse_callback_query(&req.uri().to_string()) {
                    Some(result) => {
                        *captured.lock().await = Some(result);
                        "<html><body>Authorization received. You can close this window and \
                         return to the terminal.</body></html>"
                    }
                    None => "<html><body>Waiting for the Google authorization redirect...\
                             </body></html>",
                };
                Ok::<_, std::convert::Infallible>(hyper::Response::new(Full::new(Bytes::from(
                    body,
                ))))
            }
        });

        // Serve the single connection, then check whether the redirect landed on it.
        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
            debug!("OAuth callback connection error: {e}");
        }
        if let Some(result) = captured.lock().await.take() {
            return Ok(result);
        }
    }
}

/// Pulls `code` and `state` out of the redirect request's query string.
fn parse_callback_query(path_and_query: &str) -> Option<(String, String)> {
    let full_url = format!("http://localhost{path_and_query}");
    let url = url::Url::parse(&full_url).ok()?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            _ => {}
        }
    }
    Some((code?, state?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_query() {
        let parsed = parse_callback_query("/?state=xyz&code=4%2FabcDEF&scope=foo").unwrap();
        assert_eq!(parsed.0, "4/abcDEF");
        assert_eq!(parsed.1, "xyz");
    }

    #[test]
    fn test_parse_callback_query_missing_params() {
        assert!(parse_callback_query("/favicon.ico").is_none());
        assert!(parse_callback_query("/?code=only-code").is_none());
    }
}
