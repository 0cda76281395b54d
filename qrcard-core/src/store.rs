//! Card Record Store
//!
//! A pluggable key-value interface plus the card store built on it. A record
//! and its owner-index entry always change together in one `WriteBatch`.
//!
//! Key layout:
//! - `card_<id>`          persisted card record (JSON text)
//! - `user_cards_<owner>` owner index, ordered list of summaries (JSON text)

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::card::{public_url, CardRecord, CardSummary};
use crate::normalize::{normalize, serialize, Diagnostic};

pub const CARD_PREFIX: &str = "card_";
pub const INDEX_PREFIX: &str = "user_cards_";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Card not found: {0}")]
    NotFound(String),

    #[error("Card {card} belongs to another owner")]
    OwnerMismatch { card: String },

    #[error("Card has no owner")]
    MissingOwner,

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub fn card_key(id: &str) -> String {
    format!("{CARD_PREFIX}{id}")
}

pub fn index_key(owner: &str) -> String {
    format!("{INDEX_PREFIX}{owner}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(String, String),
    Delete(String),
}

/// Mutations applied all-or-nothing by `KeyValueStore::commit`.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Put(key.into(), value.into()));
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete(key.into()));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    fn apply_to(self, map: &mut BTreeMap<String, String>) {
        for op in self.ops {
            match op {
                WriteOp::Put(k, v) => {
                    map.insert(k, v);
                }
                WriteOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
    }
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Entries whose key starts with `prefix`, in key order.
    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// Apply every op or none. Readers never see half a batch.
    fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError>;

    fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.commit(WriteBatch::new().put(key, value))
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.commit(WriteBatch::new().delete(key))
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        batch.apply_to(&mut self.entries);
        Ok(())
    }
}

/// Single JSON document on disk. Each commit writes a complete new document
/// to a sibling temp file and renames it over the old one.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened file store");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(entries)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut next = self.entries.clone();
        batch.apply_to(&mut next);
        self.persist(&next)?;
        self.entries = next;
        Ok(())
    }
}

/// A card as loaded from the store.
#[derive(Debug, Clone)]
pub struct LoadedCard {
    pub card: CardRecord,
    pub diagnostics: Vec<Diagnostic>,
}

/// Card persistence over any `KeyValueStore`.
pub struct CardStore<S: KeyValueStore> {
    kv: S,
    origin: String,
}

impl<S: KeyValueStore> CardStore<S> {
    pub fn new(kv: S, origin: impl Into<String>) -> Self {
        Self { kv, origin: origin.into() }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn backend(&self) -> &S {
        &self.kv
    }

    /// Persist a card for `owner`. Assigns an id on first save, recomputes
    /// `publicUrl` and stamps `updatedAt`. Concurrent sessions resolve by
    /// last write wins.
    pub fn save(&mut self, owner: &str, card: &CardRecord) -> Result<CardRecord, StoreError> {
        let mut card = card.clone();
        let id = card.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(existing) = self.load_raw(&id)? {
            match existing.card.owner_id.as_deref() {
                Some(current) if current != owner => {
                    return Err(StoreError::OwnerMismatch { card: id });
                }
                _ => {}
            }
        }
        if let Some(claimed) = card.owner_id.as_deref() {
            if claimed != owner {
                return Err(StoreError::OwnerMismatch { card: id });
            }
        }

        card.public_url = Some(public_url(&self.origin, &id));
        card.id = Some(id.clone());
        card.owner_id = Some(owner.to_string());
        card.updated_at = Some(Utc::now());

        let summary = card.summary().ok_or(StoreError::MissingOwner)?;
        let mut index = self.index(owner)?;
        match index.iter_mut().find(|s| s.id == id) {
            Some(slot) => *slot = summary,
            None => index.push(summary),
        }

        let batch = WriteBatch::new()
            .put(card_key(&id), serde_json::to_string(&serialize(&card)?)?)
            .put(index_key(owner), serde_json::to_string(&index)?);
        self.kv.commit(batch)?;

        tracing::info!(card_id = %id, owner, "saved card");
        Ok(card)
    }

    fn load_raw(&self, id: &str) -> Result<Option<LoadedCard>, StoreError> {
        let Some(text) = self.kv.get(&card_key(id))? else {
            return Ok(None);
        };
        let raw: Value = serde_json::from_str(&text)?;
        let normalized = normalize(&raw);
        Ok(Some(LoadedCard { card: normalized.card, diagnostics: normalized.diagnostics }))
    }

    pub fn load(&self, id: &str) -> Result<LoadedCard, StoreError> {
        self.load_raw(id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Remove the record and its index entry together.
    pub fn delete(&mut self, owner: &str, id: &str) -> Result<(), StoreError> {
        let loaded = self.load(id)?;
        if loaded.card.owner_id.as_deref() != Some(owner) {
            return Err(StoreError::OwnerMismatch { card: id.to_string() });
        }

        let index: Vec<_> = self.index(owner)?.into_iter().filter(|s| s.id != id).collect();
        let batch = WriteBatch::new()
            .delete(card_key(id))
            .put(index_key(owner), serde_json::to_string(&index)?);
        self.kv.commit(batch)?;

        tracing::info!(card_id = %id, owner, "deleted card");
        Ok(())
    }

    /// Owner index as stored.
    pub fn index(&self, owner: &str) -> Result<Vec<CardSummary>, StoreError> {
        match self.kv.get(&index_key(owner))? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }

    /// Re-derive the owner index from the full record set and store it.
    pub fn rebuild_index(&mut self, owner: &str) -> Result<Vec<CardSummary>, StoreError> {
        let mut summaries = Vec::new();
        for (key, text) in self.kv.list_by_prefix(CARD_PREFIX)? {
            let raw: Value = match serde_json::from_str(&text) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(key, "skipping unreadable card record: {e}");
                    continue;
                }
            };
            let card = normalize(&raw).card;
            if card.owner_id.as_deref() == Some(owner) {
                summaries.extend(card.summary());
            }
        }
        summaries.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));

        self.kv.put(&index_key(owner), &serde_json::to_string(&summaries)?)?;
        tracing::info!(owner, cards = summaries.len(), "rebuilt owner index");
        Ok(summaries)
    }
}
