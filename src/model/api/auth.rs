use chrono::{serde::ts_seconds, DateTime, Utc};
#[cfg(test)]
use jsonwebtoken::{EncodingKey, Header};
use jsonwebtoken::{DecodingKey, TokenData, Validation};
use log::debug;
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::common::{member::Member, MemberId};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An identity token issued by the identity provider.
///
/// The signature is checked against the shared secret, but the identity
/// itself is trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "sub")]
    pub member_id: MemberId,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given member.
    pub fn new(member: &Member) -> Self {
        Self {
            member_id: member.id.clone(),
            display_name: member.display_name.clone(),
        }
    }

    /// Sign this token as the identity provider would, valid for a day.
    #[cfg(test)]
    pub fn encode(self, config: &Config) -> Result<String> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + chrono::Duration::days(1),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(token)
    }

    /// Verify and decode a signed token.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

impl From<AuthToken> for Member {
    fn from(token: AuthToken) -> Self {
        Member::new(token.member_id, token.display_name)
    }
}

/// Token claims: the identity plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Every token the request carries: the cookie first, then the `Authorization` header.
fn raw_tokens(req: &Request<'_>) -> impl Iterator<Item = String> {
    let cookie = req
        .cookies()
        .get(AUTH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string());
    let header = req
        .headers()
        .get_one("Authorization")
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    cookie.into_iter().chain(header)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// The first token that verifies wins, so a stale cookie does not hide a
    /// valid header.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                return Outcome::Failure((
                    Status::InternalServerError,
                    Error::Unauthorized("No config to verify tokens with".to_string()),
                ))
            }
        };

        let mut rejection = None;
        for raw in raw_tokens(req) {
            match Self::decode(&raw, config) {
                Ok(token) => return Outcome::Success(token),
                Err(err) => {
                    debug!("Rejected identity token: {err}");
                    rejection = Some(err);
                }
            }
        }

        let err =
            rejection.unwrap_or_else(|| Error::Unauthorized("No identity token".to_string()));
        Outcome::Failure((Status::Unauthorized, err))
    }
}
