use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::AccountId;

type Slot = Arc<AsyncMutex<()>>;

/// Table of per-account exclusive holds.
///
/// Cloning is cheap; clones share the same table. Entries exist only while some
/// scope holds or waits on the account.
#[derive(Clone, Default)]
pub struct AccountLocks {
    slots: Arc<Mutex<HashMap<AccountId, Slot>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the exclusive hold on `id`.
    pub async fn acquire(&self, id: AccountId) -> AccountHold {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(id).or_default().clone()
        };
        let guard = slot.clone().lock_owned().await;
        AccountHold {
            id,
            guard: Some(guard),
            slot,
            slots: self.slots.clone(),
        }
    }

    /// Number of accounts currently held or waited on.
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// An exclusive hold on one account, released on drop.
pub struct AccountHold {
    id: AccountId,
    guard: Option<OwnedMutexGuard<()>>,
    slot: Slot,
    slots: Arc<Mutex<HashMap<AccountId, Slot>>>,
}

impl AccountHold {
    pub fn account_id(&self) -> AccountId {
        self.id
    }
}

impl Drop for AccountHold {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        self.guard.take();
        // The table and this hold are the only references left: nobody is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for AccountHold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountHold").field("id", &self.id).finish()
    }
}
