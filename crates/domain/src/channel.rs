//! Sales channels and their expiry settings.

use serde::{Deserialize, Serialize};

use common::ChannelId;

/// A sales channel. Orders belong to exactly one channel; the channel decides
/// whether and when its unfinished orders expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub slug: String,

    /// Minutes after which an unfinished order is eligible for expiry.
    /// `None` or a non-positive value disables expiry for the channel.
    pub expire_orders_after_minutes: Option<i64>,
}

impl Channel {
    /// Effective expiry threshold in minutes, if expiry is enabled.
    pub fn expiry_threshold_minutes(&self) -> Option<i64> {
        self.expire_orders_after_minutes.filter(|m| *m > 0)
    }
}
