use serde::Serialize;

use crate::store::FriendEntry;

#[derive(Debug, Serialize)]
pub struct FriendList {
    pub user_id: String,
    pub friends: Vec<FriendEntry>,
}
