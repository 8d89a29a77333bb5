use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{
    status::CandidateStatus, tally::Tally, vote::Vote, MemberId, PropertyId,
};
use crate::tracker::{AnnotatedBallot, CandidateBallots, Consensus};

/// A ballot submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSpec {
    pub vote: Vote,
}

/// The outcome of casting a ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusDescription {
    pub status: CandidateStatus,
    pub tally: Tally,
}

impl From<Consensus> for ConsensusDescription {
    fn from(consensus: Consensus) -> Self {
        Self {
            status: consensus.status,
            tally: consensus.tally,
        }
    }
}

/// One member's ballot, for the per-member breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotView {
    pub member_id: MemberId,
    pub display_name: String,
    pub vote: Vote,
    pub updated_at: DateTime<Utc>,
}

impl From<AnnotatedBallot> for BallotView {
    fn from(annotated: AnnotatedBallot) -> Self {
        let ballot = annotated.ballot.ballot;
        Self {
            member_id: ballot.member_id,
            display_name: annotated.display_name,
            vote: ballot.vote,
            updated_at: ballot.updated_at,
        }
    }
}

/// All ballots on a candidate, with the consensus they produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotsDescription {
    pub property_id: PropertyId,
    pub status: CandidateStatus,
    pub tally: Tally,
    pub ballots: Vec<BallotView>,
}

impl From<CandidateBallots> for BallotsDescription {
    fn from(ballots: CandidateBallots) -> Self {
        Self {
            property_id: ballots.candidate.candidate.property_id,
            status: ballots.consensus.status,
            tally: ballots.consensus.tally,
            ballots: ballots.ballots.into_iter().map(Into::into).collect(),
        }
    }
}
