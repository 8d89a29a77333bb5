use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// The aggregate disposition of a group towards a candidate property.
///
/// `Voting` is both the initial state and the state of any ballot set without
/// a strict plurality. No state is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    /// No decisive majority yet.
    Voting,
    /// `yes` holds a strict plurality.
    Approved,
    /// `no` holds a strict plurality.
    Rejected,
    /// `maybe` holds a strict plurality.
    Maybe,
}

impl CandidateStatus {
    /// Does this status belong in the rejected list rather than the active one?
    pub fn is_rejected(&self) -> bool {
        *self == Self::Rejected
    }
}

impl Default for CandidateStatus {
    fn default() -> Self {
        Self::Voting
    }
}

impl Display for CandidateStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Voting => "voting",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Maybe => "maybe",
        };
        write!(f, "{name}")
    }
}

impl From<CandidateStatus> for Bson {
    fn from(status: CandidateStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// Which of the presentation lists a listing request is after.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromFormField)]
pub enum CandidateView {
    /// Everything that has not been rejected.
    Active,
    /// Only rejected candidates.
    Rejected,
    /// Every candidate regardless of status.
    All,
}

impl CandidateView {
    /// Should a candidate with the given status appear in this view?
    pub fn includes(&self, status: CandidateStatus) -> bool {
        match self {
            Self::Active => !status.is_rejected(),
            Self::Rejected => status.is_rejected(),
            Self::All => true,
        }
    }
}

impl Default for CandidateView {
    fn default() -> Self {
        Self::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_partition_statuses() {
        let all = [
            CandidateStatus::Voting,
            CandidateStatus::Approved,
            CandidateStatus::Rejected,
            CandidateStatus::Maybe,
        ];
        for status in all {
            assert_ne!(
                CandidateView::Active.includes(status),
                CandidateView::Rejected.includes(status)
            );
            assert!(CandidateView::All.includes(status));
        }
    }
}
