use serde::{Deserialize, Serialize};

use crate::UserId;

/// A chat message as it travels over the relay socket, in both directions.
///
/// On ingress the server overwrites `user_id` with the authenticated sender and,
/// when the connection was opened with a counterpart, `from_id` as well.
/// Missing numeric fields decode as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    #[serde(default)]
    pub user_id: UserId,
    pub content: String,
    #[serde(default)]
    pub from_id: UserId,
}
