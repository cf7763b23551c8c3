use std::collections::HashMap;

use murmur_types::UserId;
use murmur_types::events::RelayMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid user ID")]
    InvalidUserId,

    #[error("Invalid FROM ID")]
    InvalidFromId,
}

/// Identity resolved from the connection query before the upgrade.
///
/// `user_id` has already been vouched for by the caller's session layer; the
/// relay only checks that it is a positive integer. `from_id`, when present,
/// fixes the conversation counterpart for the lifetime of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    pub user_id: UserId,
    pub from_id: Option<UserId>,
}

impl ConnectParams {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, IdentityError> {
        let user_id = query
            .get("user_id")
            .and_then(|raw| raw.parse::<UserId>().ok())
            .filter(|id| *id > 0)
            .ok_or(IdentityError::InvalidUserId)?;

        let from_id = match query.get("from_id").filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(raw.parse::<UserId>().map_err(|_| IdentityError::InvalidFromId)?),
            None => None,
        };

        Ok(Self { user_id, from_id })
    }

    /// Overwrite the sender with this connection's user, and the counterpart
    /// with the fixed one if the connection has it.
    pub fn stamp(&self, msg: &mut RelayMessage) {
        msg.user_id = self.user_id;
        if let Some(from_id) = self.from_id {
            msg.from_id = from_id;
        }
    }
}
