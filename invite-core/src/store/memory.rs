use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    invitation_keys::{InvitationKey, InvitationKeyId},
    invitation_users::InvitationUser,
    users::UserId,
};

use super::{InvitationStore, StoreError};

#[derive(Default)]
struct MemoryState {
    keys: Vec<InvitationKey>,
    registrants: HashMap<InvitationKeyId, BTreeSet<UserId>>,
    users: HashMap<UserId, InvitationUser>,
}

/// In-process store. Every operation runs under a single lock, which gives
/// the same check-and-update atomicity the Postgres statements provide.
#[derive(Default)]
pub struct MemoryInvitationStore {
    state: Mutex<MemoryState>,
}

impl MemoryInvitationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl InvitationStore for MemoryInvitationStore {
    async fn find_key_by_token(&self, token: &str) -> Result<Option<InvitationKey>, StoreError> {
        let state = self.lock()?;
        Ok(state.keys.iter().find(|k| k.key == token).cloned())
    }

    async fn insert_key(&self, key: &InvitationKey) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.keys.iter().any(|k| k.key == key.key) {
            return Err(StoreError::DuplicateKey(key.key.clone()));
        }
        state.keys.push(key.clone());
        Ok(())
    }

    async fn find_all_keys(&self) -> Result<Vec<InvitationKey>, StoreError> {
        Ok(self.lock()?.keys.clone())
    }

    async fn delete_key(&self, id: InvitationKeyId) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let before = state.keys.len();
        state.keys.retain(|k| k.id != id);
        state.registrants.remove(&id);
        Ok(state.keys.len() < before)
    }

    async fn delete_expired_keys(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let (expired, kept): (Vec<_>, Vec<_>) =
            state.keys.drain(..).partition(|k| k.is_expired(now));
        state.keys = kept;
        for key in &expired {
            state.registrants.remove(&key.id);
        }
        Ok(expired.len() as u64)
    }

    async fn find_registrants(&self, id: InvitationKeyId) -> Result<Vec<UserId>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .registrants
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn redeem_key(
        &self,
        id: InvitationKeyId,
        registrant: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>, StoreError> {
        let mut state = self.lock()?;
        let key = match state.keys.iter_mut().find(|k| k.id == id) {
            Some(key) if key.is_usable(now) => key,
            _ => return Ok(None),
        };
        key.uses_left -= 1;
        let uses_left = key.uses_left;
        state.registrants.entry(id).or_default().insert(registrant);
        Ok(Some(uses_left))
    }

    async fn get_or_create_invitation_user(
        &self,
        inviter: UserId,
        default_quota: i32,
    ) -> Result<InvitationUser, StoreError> {
        let mut state = self.lock()?;
        Ok(state
            .users
            .entry(inviter)
            .or_insert_with(|| InvitationUser::new(inviter, default_quota))
            .clone())
    }

    async fn find_invitation_user(
        &self,
        inviter: UserId,
    ) -> Result<Option<InvitationUser>, StoreError> {
        Ok(self.lock()?.users.get(&inviter).cloned())
    }

    async fn insert_key_charged(&self, key: &InvitationKey) -> Result<Option<i32>, StoreError> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&key.from_user) {
            return Ok(None);
        }
        if state.keys.iter().any(|k| k.key == key.key) {
            return Err(StoreError::DuplicateKey(key.key.clone()));
        }
        state.keys.push(key.clone());
        Ok(state.users.get_mut(&key.from_user).map(|user| {
            user.invitations_remaining -= 1;
            user.invitations_remaining
        }))
    }
}
