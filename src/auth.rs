//! Identity of the signed-in user.
//!
//! There is no user table: the email address returned by the identity
//! provider is used directly as the access-control principal.

use std::sync::RwLock;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{internal_error, persistence_error, FolioError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    /// Token presented to the document store, if it requires one
    pub id_token: Option<String>,
}

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            id_token: None,
        }
    }
}

pub trait IdentitySession: Send + Sync {
    fn current(&self) -> Option<Identity>;

    fn email(&self) -> Option<String> {
        self.current().map(|identity| identity.email)
    }
}

#[derive(Default)]
pub struct Session {
    current: RwLock<Option<Identity>>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        trace!("auth: signed in as {}", identity.email);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(identity);
    }

    pub fn sign_out(&self) {
        trace!("auth: signed out");
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl IdentitySession for Session {
    fn current(&self) -> Option<Identity> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    email: String,
    id_token: String,
}

/// Email/password client for the identity provider's REST api
pub struct PasswordAuth {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl PasswordAuth {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, FolioError> {
        self.request("accounts:signInWithPassword", email, password)
            .await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, FolioError> {
        self.request("accounts:signUp", email, password).await
    }

    async fn request(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, FolioError> {
        let url = format!("{}/{}?key={}", self.url, method, self.api_key);
        let body = serde_json::to_string(&PasswordRequest {
            email,
            password,
            return_secure_token: true,
        })
        .map_err(internal_error)?;
        let res = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(persistence_error)?;
        if !res.status().is_success() {
            warn!("auth: {} failed with status {}", method, res.status());
            return Err(FolioError::auth_failed("Authentication failed"));
        }
        let Ok(text) = res.text().await else {
            return Err(FolioError::auth_failed("Authentication failed"));
        };
        let parsed: PasswordResponse = serde_json::from_str(&text)
            .map_err(|_| FolioError::auth_failed("Authentication failed"))?;
        Ok(Identity {
            email: parsed.email,
            id_token: Some(parsed.id_token),
        })
    }
}
