//! OAuth2 token maintenance for Google Drive.
//!
//! Obtaining the first token (consent screen, code exchange) happens outside
//! this crate; here a refresh token is traded for new access tokens and
//! tokens are revoked.

use chrono::{Duration, Utc};
use log::debug;

use crate::client::GDriveClient;
use crate::executor::HttpExecutor;
use crate::types::{
    GDriveError, GDriveErrorKind, GDriveResult, OAuthCredentials, OAuthToken, TokenResponse,
};

/// Refresh an expired access token using the refresh token.
pub fn refresh_token<E: HttpExecutor>(
    client: &GDriveClient<E>,
    credentials: &OAuthCredentials,
    refresh_token: &str,
) -> GDriveResult<OAuthToken> {
    if refresh_token.is_empty() {
        return Err(GDriveError::new(
            GDriveErrorKind::TokenExpired,
            "No refresh token available",
        ));
    }
    if credentials.client_id.is_empty() {
        return Err(GDriveError::invalid("client_id is required"));
    }

    debug!("Refreshing access token");
    let params = [
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    let resp: TokenResponse = client
        .post_form_unauthenticated(&client.config().token_url, &params)?
        .json()?;
    Ok(resp.into_refreshed(refresh_token))
}

/// Refresh the client's own token in place.
pub fn refresh_client_token<E: HttpExecutor>(
    client: &mut GDriveClient<E>,
    credentials: &OAuthCredentials,
) -> GDriveResult<()> {
    let refresh = client
        .token()
        .and_then(|t| t.refresh_token.clone())
        .unwrap_or_default();
    let token = refresh_token(client, credentials, &refresh)?;
    client.set_token(token);
    Ok(())
}

/// Revoke a token (access or refresh).
pub fn revoke_token<E: HttpExecutor>(client: &GDriveClient<E>, token: &str) -> GDriveResult<()> {
    if token.is_empty() {
        return Err(GDriveError::invalid("Token string is empty"));
    }

    debug!("Revoking token");
    client.post_form_unauthenticated(&client.config().revoke_url, &[("token", token)])?;
    Ok(())
}

impl TokenResponse {
    /// Token minted by exchanging `used_refresh`. Google only sometimes
    /// rotates the refresh token, so the one just used is kept otherwise.
    fn into_refreshed(self, used_refresh: &str) -> OAuthToken {
        OAuthToken {
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            refresh_token: self.refresh_token.or_else(|| Some(used_refresh.to_owned())),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".into()),
            access_token: self.access_token,
            scope: self.scope,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
