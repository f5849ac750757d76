//! Feed tab vocabulary.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Which feed the user is looking at.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FeedTab {
    /// Every post, newest first.
    #[default]
    #[strum(to_string = "global", serialize = "for_you")]
    Global,
    /// Posts by users the current user follows.
    #[strum(to_string = "followed", serialize = "coven")]
    Followed,
}
