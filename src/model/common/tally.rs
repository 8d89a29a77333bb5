use serde::{Deserialize, Serialize};

use super::{status::CandidateStatus, vote::Vote};

/// Vote counts for a single candidate.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub yes: u32,
    pub no: u32,
    pub maybe: u32,
}

impl Tally {
    /// Count the given votes.
    pub fn from_votes(votes: impl IntoIterator<Item = Vote>) -> Self {
        let mut tally = Self::default();
        for vote in votes {
            tally.add(vote);
        }
        tally
    }

    /// Count one more vote.
    pub fn add(&mut self, vote: Vote) {
        match vote {
            Vote::Yes => self.yes += 1,
            Vote::No => self.no += 1,
            Vote::Maybe => self.maybe += 1,
        }
    }

    /// Total number of ballots counted.
    pub fn total(&self) -> u32 {
        self.yes + self.no + self.maybe
    }

    /// Derive the aggregate status.
    ///
    /// A category wins only if its count strictly exceeds both of the others.
    /// An empty tally and any tie for the lead are both undecided, so the
    /// result never depends on the order in which ballots arrived.
    pub fn status(&self) -> CandidateStatus {
        let Self { yes, no, maybe } = *self;
        if self.total() == 0 {
            CandidateStatus::Voting
        } else if yes > no && yes > maybe {
            CandidateStatus::Approved
        } else if no > yes && no > maybe {
            CandidateStatus::Rejected
        } else if maybe > yes && maybe > no {
            CandidateStatus::Maybe
        } else {
            CandidateStatus::Voting
        }
    }
}

impl FromIterator<Vote> for Tally {
    fn from_iter<I: IntoIterator<Item = Vote>>(iter: I) -> Self {
        Self::from_votes(iter)
    }
}
