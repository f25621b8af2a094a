//! In-memory store with per-key expiration.
//!
//! Backs the `memory` adapter kind and every engine test. Expiration
//! runs against an internal second-resolution clock that tests can
//! advance, so TTL behavior is exercised without sleeping. Expired keys
//! are purged lazily when an operation touches them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use satchel_core::{StoreError, StoreResult};

use crate::batch::{WriteBatch, WriteOp};
use crate::traits::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Record(HashMap<String, Vec<u8>>),
    Set(HashSet<String>),
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Absolute expiry deadline per key; a key is live while
    /// `now < deadline`.
    deadlines: HashMap<String, i64>,
}

#[derive(Debug)]
struct Inner {
    state: RwLock<State>,
    clock: AtomicI64,
}

/// Shared-handle in-memory store. Clones see the same data and clock.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                clock: AtomicI64::new(Utc::now().timestamp()),
            }),
        }
    }

    /// Current store time in Unix seconds.
    pub fn now_secs(&self) -> i64 {
        self.inner.clock.load(Ordering::SeqCst)
    }

    /// Moves the store clock forward. Test hook; expired keys disappear
    /// on their next access.
    pub fn advance_secs(&self, secs: i64) {
        self.inner.clock.fetch_add(secs, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.inner.state.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_shape(key: &str) -> StoreError {
    StoreError::Command {
        reason: format!("wrong entry shape for key [{key}]"),
    }
}

fn purge_if_expired(state: &mut State, key: &str, now: i64) {
    if state.deadlines.get(key).is_some_and(|deadline| *deadline <= now) {
        state.entries.remove(key);
        state.deadlines.remove(key);
    }
}

fn drop_key(state: &mut State, key: &str) {
    state.entries.remove(key);
    state.deadlines.remove(key);
}

fn apply_op(state: &mut State, op: WriteOp, now: i64) -> StoreResult<()> {
    purge_if_expired(state, op.key(), now);
    match op {
        WriteOp::PutField { key, field, value } => {
            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry::Record(HashMap::new()));
            match entry {
                Entry::Record(fields) => {
                    fields.insert(field, value);
                }
                Entry::Set(_) => return Err(wrong_shape(&key)),
            }
        }
        WriteOp::ExpireIn { key, ttl_secs } => {
            if ttl_secs <= 0 {
                drop_key(state, &key);
            } else if state.entries.contains_key(&key) {
                state.deadlines.insert(key, now + ttl_secs);
            }
        }
        WriteOp::ExpireAt { key, epoch_secs } => {
            if epoch_secs <= now {
                drop_key(state, &key);
            } else if state.entries.contains_key(&key) {
                state.deadlines.insert(key, epoch_secs);
            }
        }
        WriteOp::AddMembers { key, members } => {
            if members.is_empty() {
                return Ok(());
            }
            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry::Set(HashSet::new()));
            match entry {
                Entry::Set(set) => {
                    set.extend(members);
                }
                Entry::Record(_) => return Err(wrong_shape(&key)),
            }
        }
        WriteOp::RemoveMembers { key, members } => match state.entries.get_mut(&key) {
            Some(Entry::Set(set)) => {
                for member in &members {
                    set.remove(member);
                }
                if set.is_empty() {
                    drop_key(state, &key);
                }
            }
            Some(Entry::Record(_)) => return Err(wrong_shape(&key)),
            None => {}
        },
        WriteOp::Delete { key } => {
            drop_key(state, &key);
        }
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn field(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.now_secs();
        let mut state = self.lock()?;
        purge_if_expired(&mut state, key, now);
        Ok(match state.entries.get(key) {
            Some(Entry::Record(fields)) => fields.get(field).cloned(),
            _ => None,
        })
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = self.now_secs();
        let mut state = self.lock()?;
        purge_if_expired(&mut state, key, now);
        Ok(state.entries.contains_key(key))
    }

    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let now = self.now_secs();
        let mut state = self.lock()?;
        purge_if_expired(&mut state, key, now);
        let mut members: Vec<String> = match state.entries.get(key) {
            Some(Entry::Set(set)) => set.iter().cloned().collect(),
            _ => Vec::new(),
        };
        members.sort();
        Ok(members)
    }

    async fn is_member(&self, key: &str, member: &str) -> StoreResult<bool> {
        let now = self.now_secs();
        let mut state = self.lock()?;
        purge_if_expired(&mut state, key, now);
        Ok(match state.entries.get(key) {
            Some(Entry::Set(set)) => set.contains(member),
            _ => false,
        })
    }

    async fn member_count(&self, key: &str) -> StoreResult<u64> {
        let now = self.now_secs();
        let mut state = self.lock()?;
        purge_if_expired(&mut state, key, now);
        Ok(match state.entries.get(key) {
            Some(Entry::Set(set)) => set.len() as u64,
            _ => 0,
        })
    }

    async fn intersection(&self, keys: &[String]) -> StoreResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let now = self.now_secs();
        let mut state = self.lock()?;
        for key in keys {
            purge_if_expired(&mut state, key, now);
        }
        let mut common: Option<HashSet<String>> = None;
        for key in keys {
            let set = match state.entries.get(key) {
                Some(Entry::Set(set)) => set.clone(),
                _ => HashSet::new(),
            };
            common = Some(match common {
                Some(acc) => acc.intersection(&set).cloned().collect(),
                None => set,
            });
        }
        let mut members: Vec<String> = common.unwrap_or_default().into_iter().collect();
        members.sort();
        Ok(members)
    }

    async fn union(&self, keys: &[String]) -> StoreResult<Vec<String>> {
        let now = self.now_secs();
        let mut state = self.lock()?;
        let mut all = HashSet::new();
        for key in keys {
            purge_if_expired(&mut state, key, now);
            if let Some(Entry::Set(set)) = state.entries.get(key) {
                all.extend(set.iter().cloned());
            }
        }
        let mut members: Vec<String> = all.into_iter().collect();
        members.sort();
        Ok(members)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = self.now_secs();
        let mut state = self.lock()?;
        let candidates: Vec<String> = state
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        let mut live = Vec::with_capacity(candidates.len());
        for key in candidates {
            purge_if_expired(&mut state, &key, now);
            if state.entries.contains_key(&key) {
                live.push(key);
            }
        }
        live.sort();
        Ok(live)
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let now = self.now_secs();
        let mut state = self.lock()?;
        for op in batch.into_ops() {
            apply_op(&mut state, op, now)?;
        }
        Ok(())
    }
}
