use serde::{Deserialize, Serialize};
use waddle_core::types::{CommunityId, Platform};

/// A platform server the operator's community has some presence on — the
/// durable record the Gateway Creator ensures exists before registering a
/// gateway onto it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformServer {
    pub platform: Platform,
    pub server_id: String,
    pub community_id: CommunityId,
}

/// One activated platform channel: the gateway record plus its activation
/// code, which the operator redeems to complete OAuth/bot-invite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateway {
    pub platform: Platform,
    pub server_id: String,
    pub channel_id: String,
    pub community_id: CommunityId,
    pub activation_code: String,
    pub activated: bool,
}
