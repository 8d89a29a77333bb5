//! Types shared between the API, database and tracker layers.

pub mod invite;
pub mod member;
pub mod role;
pub mod status;
pub mod tally;
pub mod vote;

/// Identifier of a member, as issued by the external identity provider.
pub type MemberId = String;

/// Reference to a listing owned by the external property service.
pub type PropertyId = String;
