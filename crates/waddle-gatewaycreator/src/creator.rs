use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;
use waddle_channels::{Channel, MessageFormat, OutboundMessage};
use waddle_core::types::{CommunityId, Platform};
use waddle_sessions::EntityStore;

use crate::db::GatewayStore;
use crate::error::Result;
use crate::types::Gateway;

/// Stateless orchestrator over `GatewayStore` + `EntityStore` + a receiver
/// `Channel`: create-if-missing platform server, allocate an activation
/// code, register the gateway, dispatch the onboarding message. Delete
/// reverses the steps in opposite order, tolerating partial cleanup.
pub struct GatewayCreator {
    gateways: Arc<GatewayStore>,
    entities: Arc<EntityStore>,
}

impl GatewayCreator {
    pub fn new(gateways: Arc<GatewayStore>, entities: Arc<EntityStore>) -> Self {
        Self { gateways, entities }
    }

    #[instrument(skip(self, receiver))]
    pub async fn create(
        &self,
        platform: Platform,
        server_id: &str,
        channel_id: &str,
        community_id: CommunityId,
        receiver: &dyn Channel,
        onboarding_recipient_id: &str,
    ) -> Result<Gateway> {
        self.gateways.ensure_platform_server(platform, server_id, community_id)?;

        let activation_code = Uuid::new_v4().to_string();
        self.gateways
            .register_gateway(platform, server_id, channel_id, community_id, &activation_code)?;

        self.entities.create_or_activate(platform, server_id, channel_id, community_id)?;

        let onboarding = OutboundMessage {
            channel: platform.to_string(),
            recipient_id: onboarding_recipient_id.to_string(),
            content: format!(
                "Welcome! Complete setup with activation code {activation_code}, then invite the bot to finish OAuth."
            ),
            format: MessageFormat::PlainText,
        };

        if let Err(e) = receiver.send(&onboarding).await {
            warn!(error = %e, "onboarding message delivery failed; gateway remains pending activation");
        } else {
            info!(%platform, server_id, channel_id, "onboarding message dispatched");
        }

        Ok(self
            .gateways
            .get_gateway(platform, server_id, channel_id)?
            .expect("just registered"))
    }

    pub fn activate(&self, platform: Platform, server_id: &str, channel_id: &str) -> Result<()> {
        self.gateways.mark_activated(platform, server_id, channel_id)?;
        Ok(())
    }

    /// Reverses `create`'s steps in opposite order. Each step tolerates the
    /// underlying row already being gone.
    #[instrument(skip(self))]
    pub fn delete(&self, platform: Platform, server_id: &str, channel_id: &str) -> Result<()> {
        self.entities.deactivate(platform, server_id, channel_id)?;
        self.gateways.remove_gateway(platform, server_id, channel_id)?;
        info!(%platform, server_id, channel_id, "gateway deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use waddle_channels::{ChannelError, ChannelStatus};

    struct StubReceiver {
        sent: std::sync::Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl Channel for StubReceiver {
        fn name(&self) -> &str {
            "stub"
        }
        async fn connect(&mut self) -> std::result::Result<(), ChannelError> {
            Ok(())
        }
        async fn disconnect(&mut self) -> std::result::Result<(), ChannelError> {
            Ok(())
        }
        async fn send(&self, msg: &OutboundMessage) -> std::result::Result<(), ChannelError> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
        fn status(&self) -> ChannelStatus {
            ChannelStatus::Connected
        }
    }

    fn creator() -> GatewayCreator {
        let gateways = Arc::new(GatewayStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let entities = Arc::new(EntityStore::new(Connection::open_in_memory().unwrap()).unwrap());
        GatewayCreator::new(gateways, entities)
    }

    #[tokio::test]
    async fn create_registers_gateway_and_sends_onboarding() {
        let creator = creator();
        let receiver = StubReceiver { sent: std::sync::Mutex::new(Vec::new()) };
        let gw = creator
            .create(Platform::Twitch, "s1", "c1", CommunityId(1), &receiver, "user-1")
            .await
            .unwrap();
        assert!(!gw.activated);
        assert_eq!(receiver.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_then_delete_then_recreate_is_tolerant() {
        let creator = creator();
        let receiver = StubReceiver { sent: std::sync::Mutex::new(Vec::new()) };
        creator
            .create(Platform::Twitch, "s1", "c1", CommunityId(1), &receiver, "user-1")
            .await
            .unwrap();
        creator.delete(Platform::Twitch, "s1", "c1").unwrap();
        // Deleting twice must not error.
        creator.delete(Platform::Twitch, "s1", "c1").unwrap();
        let gw = creator
            .create(Platform::Twitch, "s1", "c1", CommunityId(2), &receiver, "user-2")
            .await
            .unwrap();
        assert_eq!(gw.community_id, CommunityId(2));
    }
}
