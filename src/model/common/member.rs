use serde::{Deserialize, Serialize};

use super::MemberId;

/// The caller of an operation, as vouched for by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub display_name: String,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Member {
        pub fn example1() -> Self {
            Self::new("5b0c1a9e-5a6e-4c1f-9a43-4b8d3e0f1a01", "Astrid")
        }

        pub fn example2() -> Self {
            Self::new("5b0c1a9e-5a6e-4c1f-9a43-4b8d3e0f1a02", "Björn")
        }

        pub fn example3() -> Self {
            Self::new("5b0c1a9e-5a6e-4c1f-9a43-4b8d3e0f1a03", "Cecilia")
        }

        pub fn outsider() -> Self {
            Self::new("5b0c1a9e-5a6e-4c1f-9a43-4b8d3e0f1aff", "Okänd")
        }
    }
}
