//! Project visibility, determining the lowest access an unrelated
//! principal receives.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectVisibility {
    Private,
    TeamRestricted,
    TeamOpen,
    PublicRead,
    PublicFull,
}

impl ProjectVisibility {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectVisibility::Private => "private",
            ProjectVisibility::TeamRestricted => "team_restricted",
            ProjectVisibility::TeamOpen => "team_open",
            ProjectVisibility::PublicRead => "public_read",
            ProjectVisibility::PublicFull => "public_full",
        }
    }
}
