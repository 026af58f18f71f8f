use reqwest::{
    Client as HttpClient,
    header::{ HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE },
};
use serde::{ Deserialize, Serialize };
use std::time::Duration;
use url::Url;

use super::ApiError;

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    user: Option<TokenUser>,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
}

/// An authenticated backend session. The access token is what every other
/// client in this crate sends as its bearer.
#[derive(Clone, Debug)]
pub struct AuthSession {
    pub access_token: String,
    pub user_id: Option<String>,
}

/// Minimal password-grant client for the managed auth service. Session
/// storage and refresh are the backend's concern, not this layer's.
pub struct AuthClient {
    http: HttpClient,
    base_url: String,
}

impl AuthClient {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        connect_timeout: Duration
    ) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url).map_err(|e|
            ApiError::Config(format!("invalid backend URL '{}': {}", base_url, e))
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !anon_key.is_empty() {
            headers.insert(
                HeaderName::from_static("apikey"),
                HeaderValue::from_str(anon_key).map_err(|e|
                    ApiError::Config(format!("invalid anon key: {}", e))
                )?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str
    ) -> Result<AuthSession, ApiError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let resp = self.http
            .post(&url)
            .json(&(PasswordGrant { email, password }))
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, text));
        }

        let token: TokenResponse = resp.json().await?;
        Ok(AuthSession {
            access_token: token.access_token,
            user_id: token.user.map(|u| u.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_responses_tolerate_a_missing_user_object() {
        let token: TokenResponse = serde_json
            ::from_str("{\"access_token\":\"jwt\"}")
            .unwrap();
        assert_eq!(token.access_token, "jwt");
        assert!(token.user.is_none());
    }
}
