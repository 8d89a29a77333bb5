use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// A single member's opinion on a candidate property.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Yes,
    No,
    Maybe,
}

impl Display for Vote {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Maybe => "maybe",
        };
        write!(f, "{name}")
    }
}

impl From<Vote> for Bson {
    fn from(vote: Vote) -> Self {
        to_bson(&vote).expect("Serialisation is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_serialise_lowercase() {
        assert_eq!(Bson::from(Vote::Maybe), Bson::String("maybe".to_string()));
        let parsed: Vote = rocket::serde::json::serde_json::from_str("\"no\"").unwrap();
        assert_eq!(parsed, Vote::No);
    }
}
