//! NTCONTROL authentication session
//!
//! On connect the projector sends either `NTCONTROL 0` (no protection) or
//! `NTCONTROL 1 {seed}`. In the protected case every outbound command must be
//! prefixed with `md5("{username}:{password}:{seed}")` as 32 lowercase hex
//! characters. Until one of the markers has been seen on the current
//! connection, nothing may be transmitted.
//!
//! Serial sessions never authenticate: their gate is always open and they never
//! hold a digest.

use std::fmt;

use md5::{Digest, Md5};
use proj_protocol::{reply, TransportVariant};
use tracing::debug;

use crate::error::AuthError;

/// Username/password pair for the NTCONTROL digest
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    /// Projector account name
    pub username: String,
    /// Projector account password
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Compute the NTCONTROL digest for a challenge seed
pub fn compute_digest(credentials: &Credentials, seed: &str) -> String {
    let input = format!("{}:{}:{}", credentials.username, credentials.password, seed);
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Per-connection authentication state
#[derive(Debug)]
pub struct AuthSession {
    variant: TransportVariant,
    credentials: Option<Credentials>,
    seed: Option<String>,
    digest: Option<String>,
    cleared: bool,
}

impl AuthSession {
    /// Create an unauthenticated session for the given transport
    pub fn new(variant: TransportVariant, credentials: Option<Credentials>) -> Self {
        Self {
            variant,
            credentials,
            seed: None,
            digest: None,
            cleared: !variant.requires_handshake(),
        }
    }

    /// Handle an `ntcontrol 1 {seed}` line and return the digest now in use
    pub fn on_challenge(&mut self, line: &str) -> Result<&str, AuthError> {
        if !self.variant.requires_handshake() {
            return Err(AuthError::NotApplicable);
        }
        let seed =
            reply::challenge_seed(line).map_err(|_| AuthError::MissingSeed(line.to_string()))?;
        let credentials = self.credentials.as_ref().ok_or(AuthError::NoCredentials)?;

        let digest = compute_digest(credentials, &seed);
        debug!("Computed NTCONTROL digest for seed {}", seed);

        self.seed = Some(seed);
        self.cleared = true;
        Ok(self.digest.insert(digest).as_str())
    }

    /// Handle an `ntcontrol 0` line: transmit without a digest
    pub fn on_no_auth(&mut self) {
        self.seed = None;
        self.digest = None;
        self.cleared = true;
    }

    /// Prefix the payload with the digest, if one is held
    pub fn apply_prefix(&self, payload: &[u8]) -> Vec<u8> {
        match &self.digest {
            Some(digest) => {
                let mut out = Vec::with_capacity(digest.len() + payload.len());
                out.extend_from_slice(digest.as_bytes());
                out.extend_from_slice(payload);
                out
            }
            None => payload.to_vec(),
        }
    }

    /// Whether transmission is allowed on the current connection
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// The digest currently prefixed to commands
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The last challenge seed
    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    /// Forget everything learned on the previous connection
    pub fn reset(&mut self) {
        self.seed = None;
        self.digest = None;
        self.cleared = !self.variant.requires_handshake();
    }
}
