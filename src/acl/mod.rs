use crate::db::store::UserStore;
use crate::errors::{BotError, BotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Admin,
    User,
    Banned,
}

impl Role {
    /// Owner and admins get emphasised captions and bypass the subscription gate.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Anyone,
    Admin,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthDecision {
    pub user_id: i64,
    pub allowed: bool,
    pub role: Role,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetChange {
    Applied,
    Unchanged,
    OwnerImmutable,
}

pub fn parse_user_id(raw: &str) -> BotResult<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BotError::InvalidInput("missing user id".to_string()));
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| BotError::InvalidInput(format!("'{trimmed}' is not a numeric user id")))
}

/// Owner/admin/ban classification. The owner comes from configuration and is
/// never stored, removed or banned; admins and bans live in the user store.
#[derive(Clone)]
pub struct AccessPolicy {
    owner_id: i64,
    store: UserStore,
}

impl AccessPolicy {
    pub fn new(owner_id: i64, store: UserStore) -> Self {
        AccessPolicy { owner_id, store }
    }

    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn role(&self, user_id: i64) -> Role {
        if user_id == self.owner_id {
            Role::Owner
        } else if self.store.is_banned(user_id) {
            Role::Banned
        } else if self.store.is_admin(user_id) {
            Role::Admin
        } else {
            Role::User
        }
    }

    pub fn authorize(&self, user_id: i64, requirement: Requirement) -> AuthDecision {
        let role = self.role(user_id);
        let (allowed, reason) = match (role, requirement) {
            (Role::Banned, _) => (false, "banned"),
            (Role::Owner, _) => (true, "owner"),
            (Role::Admin, Requirement::Owner) => (false, "owner_only"),
            (Role::Admin, _) => (true, "admin"),
            (Role::User, Requirement::Anyone) => (true, "anyone"),
            (Role::User, Requirement::Admin) => (false, "admin_only"),
            (Role::User, Requirement::Owner) => (false, "owner_only"),
        };
        AuthDecision {
            user_id,
            allowed,
            role,
            reason,
        }
    }

    /// Admin ids with the owner first.
    pub fn admins(&self) -> Vec<i64> {
        let mut admins = vec![self.owner_id];
        admins.extend(
            self.store
                .admins()
                .into_iter()
                .filter(|id| *id != self.owner_id),
        );
        admins
    }

    pub async fn add_admin(&self, user_id: i64) -> BotResult<SetChange> {
        if user_id == self.owner_id {
            return Ok(SetChange::Unchanged);
        }
        Ok(applied(self.store.insert_admin(user_id).await?))
    }

    pub async fn remove_admin(&self, user_id: i64) -> BotResult<SetChange> {
        if user_id == self.owner_id {
            return Ok(SetChange::OwnerImmutable);
        }
        Ok(applied(self.store.remove_admin(user_id).await?))
    }

    pub async fn ban(&self, user_id: i64) -> BotResult<SetChange> {
        if user_id == self.owner_id {
            return Ok(SetChange::OwnerImmutable);
        }
        Ok(applied(self.store.insert_ban(user_id).await?))
    }

    pub async fn unban(&self, user_id: i64) -> BotResult<SetChange> {
        Ok(applied(self.store.remove_ban(user_id).await?))
    }
}

fn applied(changed: bool) -> SetChange {
    if changed {
        SetChange::Applied
    } else {
        SetChange::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: i64 = 1;

    fn policy() -> AccessPolicy {
        AccessPolicy::new(OWNER, UserStore::in_memory())
    }

    #[tokio::test]
    async fn owner_is_always_admin_and_cannot_be_removed() {
        let policy = policy();
        assert_eq!(policy.admins(), vec![OWNER]);
        assert_eq!(
            policy.remove_admin(OWNER).await.unwrap(),
            SetChange::OwnerImmutable
        );
        assert_eq!(policy.role(OWNER), Role::Owner);
    }

    #[tokio::test]
    async fn admins_can_be_added_once_and_removed() {
        let policy = policy();
        assert_eq!(policy.add_admin(5).await.unwrap(), SetChange::Applied);
        assert_eq!(policy.add_admin(5).await.unwrap(), SetChange::Unchanged);
        assert_eq!(policy.admins(), vec![OWNER, 5]);
        assert_eq!(policy.role(5), Role::Admin);

        assert_eq!(policy.remove_admin(5).await.unwrap(), SetChange::Applied);
        assert_eq!(policy.remove_admin(5).await.unwrap(), SetChange::Unchanged);
        assert_eq!(policy.role(5), Role::User);
    }

    #[tokio::test]
    async fn bans_override_admin_rights_but_never_the_owner() {
        let policy = policy();
        policy.add_admin(5).await.unwrap();
        policy.ban(5).await.unwrap();

        let decision = policy.authorize(5, Requirement::Anyone);
        assert_eq!(decision.user_id, 5);
        assert!(!decision.allowed);
        assert_eq!(decision.role, Role::Banned);
        assert_eq!(policy.ban(OWNER).await.unwrap(), SetChange::OwnerImmutable);

        policy.unban(5).await.unwrap();
        assert!(policy.authorize(5, Requirement::Admin).allowed);
    }

    #[test]
    fn owner_only_commands_reject_admins_and_users() {
        let policy = policy();
        assert!(policy.authorize(OWNER, Requirement::Owner).allowed);
        assert!(!policy.authorize(9, Requirement::Owner).allowed);
        assert!(!policy.authorize(9, Requirement::Admin).allowed);
        assert!(policy.authorize(9, Requirement::Anyone).allowed);
    }

    #[tokio::test]
    async fn open_commands_admit_every_role_but_banned() {
        let policy = policy();
        policy.add_admin(5).await.unwrap();
        policy.ban(6).await.unwrap();

        for (user_id, role) in [(OWNER, Role::Owner), (5, Role::Admin), (9, Role::User)] {
            let decision = policy.authorize(user_id, Requirement::Anyone);
            assert!(decision.allowed);
            assert_eq!(decision.user_id, user_id);
            assert_eq!(decision.role, role);
        }
        let banned = policy.authorize(6, Requirement::Anyone);
        assert!(!banned.allowed);
        assert_eq!(banned.reason, "banned");
    }

    #[test]
    fn user_ids_must_be_numeric() {
        assert_eq!(parse_user_id(" 123 ").unwrap(), 123);
        assert!(matches!(
            parse_user_id("abc"),
            Err(BotError::InvalidInput(_))
        ));
        assert!(matches!(parse_user_id(""), Err(BotError::InvalidInput(_))));
    }
}
