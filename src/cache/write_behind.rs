//! Best-effort persistence writes
//!
//! Population and hit accounting on the persistent tier are not on the
//! caller's critical path. In [`WriteMode::Background`] they go through an
//! unbounded queue drained by a dedicated task; failures are logged and
//! counted, never returned. [`WriteMode::Inline`] awaits each write in place
//! with the same error policy.

use crate::cache::{entry::PersistentCacheRecord, persistent::PersistentTier};
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// How persistent-tier writes are issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Await every write before returning
    Inline,
    /// Queue writes to a background task
    Background,
}

impl FromStr for WriteMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inline" | "sync" => Ok(WriteMode::Inline),
            "background" | "async" => Ok(WriteMode::Background),
            _ => Err(CacheError::ConfigError(format!("unknown write mode '{}'", s))),
        }
    }
}

#[derive(Debug)]
enum PersistCommand {
    Put(PersistentCacheRecord),
    Touch { key: String, at: DateTime<Utc> },
    Flush(oneshot::Sender<()>),
}

/// Writer in front of the persistent tier
pub struct PersistQueue {
    tier: PersistentTier,
    // dropping the sender lets the worker drain the queue and exit
    sender: Option<mpsc::UnboundedSender<PersistCommand>>,
    errors: Arc<AtomicU64>,
}

impl PersistQueue {
    /// Build a writer; `Background` spawns its worker on the current tokio runtime
    /// and fails outside of one
    pub fn new(tier: PersistentTier, mode: WriteMode, errors: Arc<AtomicU64>) -> crate::error::Result<Self> {
        match mode {
            WriteMode::Inline => Ok(Self {
                tier,
                sender: None,
                errors,
            }),
            WriteMode::Background => {
                let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                    CacheError::ConfigError(format!("background write mode needs a tokio runtime: {}", e))
                })?;

                let (tx, rx) = mpsc::unbounded_channel();
                runtime.spawn(run_worker(tier.clone(), rx, errors.clone()));
                Ok(Self {
                    tier,
                    sender: Some(tx),
                    errors,
                })
            }
        }
    }

    pub fn mode(&self) -> WriteMode {
        if self.sender.is_some() {
            WriteMode::Background
        } else {
            WriteMode::Inline
        }
    }

    /// Store a freshly produced record
    pub async fn put(&self, record: PersistentCacheRecord) {
        match &self.sender {
            Some(tx) => self.enqueue(tx, PersistCommand::Put(record)),
            None => {
                let key = record.cache_key.clone();
                if let Err(e) = self.tier.put(record).await {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Persistent cache store failed for {}: {}", key, e);
                }
            }
        }
    }

    /// Record a persistent-tier hit
    pub async fn record_hit(&self, key: &str, at: DateTime<Utc>) {
        match &self.sender {
            Some(tx) => self.enqueue(
                tx,
                PersistCommand::Touch {
                    key: key.to_string(),
                    at,
                },
            ),
            None => {
                if let Err(e) = self.tier.increment_hit_at(key, at).await {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Persistent hit count update failed for {}: {}", key, e);
                }
            }
        }
    }

    /// Wait until every write queued before this call has been applied
    pub async fn flush(&self) {
        if let Some(tx) = &self.sender {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(PersistCommand::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.await;
            }
        }
    }

    fn enqueue(&self, tx: &mpsc::UnboundedSender<PersistCommand>, command: PersistCommand) {
        if let Err(e) = tx.send(command) {
            self.errors.fetch_add(1, Ordering::Relaxed);
            warn!("Persistent write queue closed, dropping {:?}", e.0);
        }
    }
}

async fn run_worker(
    tier: PersistentTier,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    errors: Arc<AtomicU64>,
) {
    debug!("Persistent write-behind worker started");

    while let Some(command) = rx.recv().await {
        match command {
            PersistCommand::Put(record) => {
                let key = record.cache_key.clone();
                if let Err(e) = tier.put(record).await {
                    errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Persistent cache store failed for {}: {}", key, e);
                }
            }
            PersistCommand::Touch { key, at } => {
                if let Err(e) = tier.increment_hit_at(&key, at).await {
                    errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Persistent hit count update failed for {}: {}", key, e);
                }
            }
            PersistCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    debug!("Persistent write-behind worker stopped");
}
