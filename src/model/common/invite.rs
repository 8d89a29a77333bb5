use std::fmt::{Display, Formatter};

use data_encoding::BASE32_NOPAD;
use mongodb::bson::Bson;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Number of random bytes behind an invite code.
pub const INVITE_CODE_BYTES: usize = 10;

/// The opaque code other users enter to join a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
    /// Generate a fresh random code.
    pub fn generate(mut rng: impl RngCore + CryptoRng) -> Self {
        let mut bytes = [0u8; INVITE_CODE_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(BASE32_NOPAD.encode(&bytes))
    }

    /// Normalise user input: codes are case-insensitive and may be pasted with whitespace.
    pub fn parse(input: &str) -> Self {
        Self(input.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InviteCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<InviteCode> for Bson {
    fn from(code: InviteCode) -> Self {
        Bson::String(code.0)
    }
}
