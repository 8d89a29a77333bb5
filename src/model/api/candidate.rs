use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{status::CandidateStatus, tally::Tally, MemberId, PropertyId},
    db::candidate::Candidate,
    mongodb::ApiId,
};
use crate::tracker::CandidateDetails;

/// A request to put a property forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub property_id: PropertyId,
}

/// A candidate as shown in the listing views.
///
/// The tally is only filled in when a single candidate is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub property_id: PropertyId,
    pub added_by: MemberId,
    pub status: CandidateStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tally: Option<Tally>,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            property_id: candidate.candidate.property_id,
            added_by: candidate.candidate.added_by,
            status: candidate.candidate.status,
            created_at: candidate.candidate.created_at,
            tally: None,
        }
    }
}

impl From<CandidateDetails> for CandidateDescription {
    fn from(details: CandidateDetails) -> Self {
        Self {
            status: details.consensus.status,
            tally: Some(details.consensus.tally),
            ..Self::from(details.candidate)
        }
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl CandidateSpec {
        pub fn example() -> Self {
            Self {
                property_id: "listing-4711".to_string(),
            }
        }
    }
}
