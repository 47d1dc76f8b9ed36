// src/auth.rs
use crate::error::ApiError;
use crate::models::AccessToken;
use chrono::{DateTime, Utc};
use jsonwebtoken::dangerous_insecure_decode;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// The bearer credential every authenticated request carries.
///
/// A session is handed to the API client at construction; nothing mutates a
/// shared default header.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().trim().to_string(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    // Signature is not checked: the client never holds the signing secret.
    fn claims(&self) -> Option<Claims> {
        dangerous_insecure_decode::<Claims>(&self.token)
            .ok()
            .map(|data| data.claims)
    }

    /// Subject claim of the token, the backend's user id.
    pub fn subject(&self) -> Option<String> {
        self.claims().and_then(|c| c.sub)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims()
            .and_then(|c| c.exp)
            .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
    }

    /// Opaque tokens and tokens without `exp` are assumed valid; the backend
    /// has the final word.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at(), Some(exp) if exp <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl From<AccessToken> for Session {
    fn from(token: AccessToken) -> Self {
        Session::new(token.access_token)
    }
}

/// File-backed persistence for the session token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, session: &Session) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, session.token())?;
        info!("Session token stored at {}", self.path.display());
        Ok(())
    }

    /// Returns `None` when no token is stored or the stored one has expired.
    pub fn load(&self) -> Result<Option<Session>, ApiError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let session = Session::new(raw);
        if session.is_expired() {
            debug!("Stored token at {} has expired", self.path.display());
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub fn clear(&self) -> Result<(), ApiError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
