use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::acl::AccessPolicy;
use crate::broadcast::BroadcastEngine;
use crate::config::Config;
use crate::cover::CoverManager;
use crate::db::store::UserStore;
use crate::gate::MembershipGate;
use crate::messenger::Messenger;
use crate::relay::RelayEngine;
use crate::scheduler::DeletionQueue;

/// Everything the handlers need, built once at startup and injected into the
/// dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: UserStore,
    pub policy: AccessPolicy,
    pub covers: CoverManager,
    pub relay: RelayEngine,
    pub gate: MembershipGate,
    pub broadcaster: BroadcastEngine,
    pub deletions: DeletionQueue,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, store: UserStore, messenger: Arc<dyn Messenger>) -> Self {
        let covers = CoverManager::new(store.clone());
        let deletions = DeletionQueue::new();
        AppState {
            policy: AccessPolicy::new(config.owner_id, store.clone()),
            relay: RelayEngine::new(store.clone(), covers.clone(), messenger.clone()),
            gate: MembershipGate::new(config.force_sub_channel.clone(), messenger.clone()),
            broadcaster: BroadcastEngine::new(
                messenger,
                deletions.clone(),
                config.broadcast_settings(),
            ),
            config: Arc::new(config),
            store,
            covers,
            deletions,
            started_at: Utc::now(),
        }
    }
}
