use std::sync::Arc;

use tracing::{debug, warn};

use crate::acl::Role;
use crate::errors::BotError;
use crate::messenger::Messenger;

/// Force-subscribe check against a designated channel.
///
/// Query errors fail closed, except `PermissionDenied` (the bot cannot read
/// the channel's member list), which fails open so users are not locked out
/// by a misconfigured channel.
#[derive(Clone)]
pub struct MembershipGate {
    channel: Option<String>,
    messenger: Arc<dyn Messenger>,
}

impl MembershipGate {
    pub fn new(channel: Option<String>, messenger: Arc<dyn Messenger>) -> Self {
        let channel = channel
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        MembershipGate { channel, messenger }
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub async fn is_member(&self, user_id: i64) -> bool {
        let Some(channel) = self.channel.as_deref() else {
            return true;
        };
        match self.messenger.chat_member_status(channel, user_id).await {
            Ok(present) => present,
            Err(BotError::PermissionDenied(detail)) => {
                warn!("Cannot verify membership in {channel} for {user_id}, allowing: {detail}");
                true
            }
            Err(err) => {
                debug!("Membership check in {channel} for {user_id} failed: {err}");
                false
            }
        }
    }

    /// Owner and admins are never gated.
    pub async fn allows(&self, user_id: i64, role: Role) -> bool {
        role.is_privileged() || self.is_member(user_id).await
    }

    /// Link shown to non-members: the configured invite link, or the public
    /// `t.me` address when the channel is an `@username`.
    pub fn join_link(&self, configured: &str) -> Option<String> {
        let configured = configured.trim();
        if !configured.is_empty() {
            return Some(configured.to_string());
        }
        let channel = self.channel.as_deref()?;
        if channel.parse::<i64>().is_ok() {
            return None;
        }
        Some(format!("https://t.me/{}", channel.trim_start_matches('@')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMessenger;

    fn gate(messenger: Arc<FakeMessenger>) -> MembershipGate {
        MembershipGate::new(Some("@updates".to_string()), messenger)
    }

    #[tokio::test]
    async fn disabled_gate_lets_everyone_through() {
        let gate = MembershipGate::new(Some("  ".to_string()), Arc::new(FakeMessenger::new()));
        assert!(gate.channel().is_none());
        assert!(gate.is_member(10).await);
    }

    #[tokio::test]
    async fn members_pass_and_others_do_not() {
        let messenger = Arc::new(FakeMessenger::new());
        messenger.add_member(10);
        let gate = gate(messenger);
        assert!(gate.is_member(10).await);
        assert!(!gate.is_member(11).await);
    }

    #[tokio::test]
    async fn missing_bot_rights_fail_open() {
        let messenger = Arc::new(FakeMessenger::new());
        messenger.fail_membership_with(BotError::PermissionDenied(
            "member list is inaccessible".to_string(),
        ));
        assert!(gate(messenger).is_member(11).await);
    }

    #[tokio::test]
    async fn other_query_errors_fail_closed() {
        let messenger = Arc::new(FakeMessenger::new());
        messenger.fail_membership_with(BotError::Transport("timeout".to_string()));
        assert!(!gate(messenger.clone()).is_member(11).await);

        messenger.fail_membership_with(BotError::NotFound("chat not found".to_string()));
        assert!(!gate(messenger).is_member(11).await);
    }

    #[tokio::test]
    async fn privileged_roles_bypass_the_gate() {
        let gate = gate(Arc::new(FakeMessenger::new()));
        assert!(gate.allows(1, Role::Owner).await);
        assert!(gate.allows(2, Role::Admin).await);
        assert!(!gate.allows(3, Role::User).await);
    }

    #[test]
    fn join_link_prefers_configured_invite() {
        let gate = gate(Arc::new(FakeMessenger::new()));
        assert_eq!(
            gate.join_link("https://t.me/+abc").as_deref(),
            Some("https://t.me/+abc")
        );
        assert_eq!(gate.join_link("").as_deref(), Some("https://t.me/updates"));

        let numeric = MembershipGate::new(
            Some("-100123".to_string()),
            Arc::new(FakeMessenger::new()),
        );
        assert_eq!(numeric.join_link(""), None);
    }
}
