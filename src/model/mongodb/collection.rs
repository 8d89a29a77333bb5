use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    ballot::{Ballot, NewBallot},
    candidate::{Candidate, NewCandidate},
    group::{Group, NewGroup},
    membership::{Membership, NewMembership},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Group collections
const GROUPS: &str = "groups";
impl MongoCollection for Group {
    const NAME: &'static str = GROUPS;
}
impl MongoCollection for NewGroup {
    const NAME: &'static str = GROUPS;
}

// Membership collections
const MEMBERSHIPS: &str = "memberships";
impl MongoCollection for Membership {
    const NAME: &'static str = MEMBERSHIPS;
}
impl MongoCollection for NewMembership {
    const NAME: &'static str = MEMBERSHIPS;
}

// Candidate collections
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for NewCandidate {
    const NAME: &'static str = CANDIDATES;
}

// Ballot collections
const BALLOTS: &str = "ballots";
impl MongoCollection for Ballot {
    const NAME: &'static str = BALLOTS;
}
impl MongoCollection for NewBallot {
    const NAME: &'static str = BALLOTS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// The unique indexes are what turns a concurrent duplicate insert into a
/// duplicate key error rather than a second record.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Group collection.
    let group_index = IndexModel::builder()
        .keys(doc! {"invite_code": 1})
        .options(unique.clone())
        .build();
    Coll::<Group>::from_db(db)
        .create_index(group_index, None)
        .await?;

    // Membership collection.
    let membership_index = IndexModel::builder()
        .keys(doc! {"group_id": 1, "member_id": 1})
        .options(unique.clone())
        .build();
    let member_lookup_index = IndexModel::builder()
        .keys(doc! {"member_id": 1})
        .build();
    Coll::<Membership>::from_db(db)
        .create_indexes([membership_index, member_lookup_index], None)
        .await?;

    // Candidate collection.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"group_id": 1, "property_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Ballot collection.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"group_id": 1, "property_id": 1, "member_id": 1})
        .options(unique)
        .build();
    Coll::<Ballot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    Ok(())
}
