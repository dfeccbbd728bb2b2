//! Transparent prepared statement cache.
//!
//! Statements are cached per (sql, parameter oids) key. An entry starts
//! unnamed; once it reaches the prepare threshold it is parsed under a
//! numbered server side name and subsequent executions skip Parse and
//! Describe entirely. The least recently used entry is evicted when the
//! cache is full, donating its number to the newcomer; a prepared evictee
//! is closed server side, piggy backed onto the next execute.
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::postgres::backend::ServerError;
use crate::result::FieldDescription;
use crate::statement::StatementName;
use crate::types::ColumnDecoder;

/// Key identifying a logical prepared statement.
///
/// The parameter oid fingerprint is part of the key since the server plans
/// per parameter type; `oids` holds each parameter oid as big endian bytes
/// and stays empty for parameterless statements.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    sql: String,
    oids: Vec<u8>,
}

impl CacheKey {
    pub fn new(sql: &str, param_oids: impl IntoIterator<Item = u32>) -> Self {
        let mut oids = Vec::new();
        for oid in param_oids {
            oids.extend_from_slice(&oid.to_be_bytes());
        }
        Self { sql: sql.to_owned(), oids }
    }
}

/// A cached statement descriptor.
#[derive(Debug)]
pub(crate) struct Statement {
    /// Cache slot, 1 based; reused after eviction.
    index: u16,
    name: StatementName,
    num_executed: u32,
    prepared: bool,
    /// Attached once the server has described the statement.
    fields: Option<Vec<FieldDescription>>,
    decoders: Option<Vec<ColumnDecoder>>,
}

impl Statement {
    fn new(index: u16) -> Self {
        Self {
            index,
            name: StatementName::indexed(index),
            num_executed: 1,
            prepared: false,
            fields: None,
            decoders: None,
        }
    }

    fn reset(&mut self) {
        self.prepared = false;
        self.num_executed = 0;
        self.fields = None;
        self.decoders = None;
    }
}

/// How the execute cycle for a key ended, for [`StatementCache::commit`].
#[derive(Debug)]
pub(crate) enum Commit<'a> {
    /// The cycle succeeded; `cacheable` when it produced exactly one
    /// non-wiping result and a missing entry should be inserted.
    Success { cacheable: bool },
    /// The server reported an error for the cycle.
    ServerError(&'a ServerError),
    /// The cycle failed client side; server side state is intact.
    Failed,
}

/// What an execute should do for a statement, derived from its cache state.
#[derive(Debug)]
pub(crate) struct CacheHit {
    /// Statement name to parse or bind under.
    pub name: StatementName,
    /// Server side resources exist: skip Parse and Describe.
    pub prepared: bool,
    /// Field list and decoders captured when the statement was described.
    pub fields: Option<Vec<FieldDescription>>,
    pub decoders: Option<Vec<ColumnDecoder>>,
}

#[derive(Debug)]
struct PendingClose {
    name: StatementName,
    /// Key of the still cached entry to reset on CloseComplete; `None`
    /// when the descriptor was evicted.
    key: Option<CacheKey>,
}

/// Insertion ordered statement cache with LRU eviction.
pub(crate) struct StatementCache {
    entries: LruCache<CacheKey, Statement>,
    prepare_threshold: u32,
    size: usize,
    pending_close: Option<PendingClose>,
}

impl StatementCache {
    pub fn new(prepare_threshold: u32, size: usize) -> Self {
        let cap = NonZeroUsize::new(size.max(1)).expect("max(1) is non zero");
        Self {
            entries: LruCache::new(cap),
            prepare_threshold,
            size: size.max(1),
            pending_close: None,
        }
    }

    /// Zero threshold disables caching entirely.
    pub fn enabled(&self) -> bool {
        self.prepare_threshold > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look a statement up without touching recency; order only moves on
    /// successful completion.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheHit> {
        let entry = self.entries.peek(key)?;

        if entry.prepared {
            // a statement scheduled for close can not be bound again
            let closing = self
                .pending_close
                .as_ref()
                .is_some_and(|close| close.name == entry.name);
            if closing {
                return Some(CacheHit {
                    name: StatementName::unnamed(),
                    prepared: false,
                    fields: None,
                    decoders: None,
                });
            }
            return Some(CacheHit {
                name: entry.name.clone(),
                prepared: true,
                fields: entry.fields.clone(),
                decoders: entry.decoders.clone(),
            });
        }

        let name = if entry.num_executed == self.prepare_threshold {
            // reached the threshold: parse under the slot name this turn
            entry.name.clone()
        } else {
            StatementName::unnamed()
        };
        Some(CacheHit { name, prepared: false, fields: None, decoders: None })
    }

    /// ParseComplete arrived: the entry that just parsed under its slot
    /// name now has server side state.
    pub fn mark_parsed(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.peek_mut(key) {
            if entry.num_executed == self.prepare_threshold {
                entry.prepared = true;
            }
        }
    }

    /// Attach the description of a freshly prepared statement so later
    /// executions skip Describe.
    pub fn attach_description(
        &mut self,
        key: &CacheKey,
        fields: &[FieldDescription],
        decoders: &[ColumnDecoder],
    ) {
        if let Some(entry) = self.entries.peek_mut(key) {
            if entry.prepared {
                entry.fields = Some(fields.to_vec());
                entry.decoders = Some(decoders.to_vec());
            }
        }
    }

    /// Settle the cache at ReadyForQuery.
    ///
    /// On success the entry moves to the recent end, its execution count
    /// grows until prepared, and a missing entry is inserted when the
    /// execution was cacheable. On a server error a prepared entry is
    /// scheduled for close, except for "statement does not exist" where
    /// the server side state is already gone and the entry is reset in
    /// place. A client side failure leaves the entry untouched.
    pub fn commit(&mut self, key: &CacheKey, outcome: Commit) {
        match self.entries.peek_mut(key) {
            None => {
                if matches!(outcome, Commit::Success { cacheable: true }) {
                    self.insert(key);
                }
            }
            Some(entry) => match outcome {
                Commit::Success { .. } => {
                    if !entry.prepared {
                        entry.num_executed += 1;
                    }
                    self.entries.promote(key);
                }
                Commit::ServerError(err) => {
                    if entry.prepared {
                        if err.is_statement_missing() {
                            entry.reset();
                        } else {
                            debug_assert!(
                                self.pending_close.is_none(),
                                "a second close scheduled while one is pending",
                            );
                            self.pending_close = Some(PendingClose {
                                name: entry.name.clone(),
                                key: Some(key.clone()),
                            });
                        }
                    }
                }
                Commit::Failed => {}
            },
        }
    }

    fn insert(&mut self, key: &CacheKey) {
        let index = if self.entries.len() == self.size {
            let (_, old) = self.entries.pop_lru().expect("cache is full");
            debug!(name = %old.name, "evicting statement");
            if old.prepared {
                self.pending_close = Some(PendingClose { name: old.name, key: None });
            }
            old.index
        } else {
            self.entries.len() as u16 + 1
        };
        self.entries.push(key.clone(), Statement::new(index));
    }

    /// Name of the statement awaiting a server side close, if any. The
    /// Close message leads the next execute payload.
    pub fn pending_close(&self) -> Option<&StatementName> {
        self.pending_close.as_ref().map(|close| &close.name)
    }

    /// CloseComplete arrived. Returns whether a close was actually pending.
    pub fn close_complete(&mut self) -> bool {
        let Some(close) = self.pending_close.take() else {
            return false;
        };
        if let Some(key) = close.key {
            // entry is still cached, it restarts unprepared
            if let Some(entry) = self.entries.peek_mut(&key) {
                entry.reset();
            }
        }
        true
    }

    /// `DISCARD ALL` / `DEALLOCATE ALL`: the server dropped every prepared
    /// statement, drop every descriptor and any pending close with it.
    pub fn wipe(&mut self) {
        debug!("wiping statement cache");
        self.entries.clear();
        self.pending_close = None;
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("len", &self.entries.len())
            .field("size", &self.size)
            .field("prepare_threshold", &self.prepare_threshold)
            .field("pending_close", &self.pending_close)
            .finish()
    }
}
