//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//!
//! Each record comes in two flavours: `NewX`, which has no ID yet and is what
//! gets inserted, and `X`, which is read back with its `_id`.

pub mod ballot;
pub mod candidate;
pub mod group;
pub mod membership;
