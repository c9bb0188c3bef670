/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Durable work queues on SQLite.
//!
//! All three queues share one `work_items` table, told apart by the `queue`
//! column. Besides the JSON payload every row carries the handful of ids the
//! pipeline may later purge by, so a delete can drop stale work with one
//! indexed statement instead of scanning payloads.
//!
//! Row status: 0 pending, 1 done, 2 dead, 3 running.

use crate::dispatch::{validate_client, validate_fedi};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fanout_protocol::{DeliveryItem, Envelope};
use rand::{rngs::OsRng, RngCore};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Client,
    Federator,
    Delivery,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Federator => "federator",
            Self::Delivery => "delivery",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indexed columns a queued item can be purged by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKey {
    ActorId,
    ObjectId,
    TargetId,
    TargetUri,
    OriginId,
    TargetAccountId,
    ReceivingId,
}

impl QueueKey {
    pub const ALL: [QueueKey; 7] = [
        Self::ActorId,
        Self::ObjectId,
        Self::TargetId,
        Self::TargetUri,
        Self::OriginId,
        Self::TargetAccountId,
        Self::ReceivingId,
    ];

    /// Column name. Only these fixed strings are ever spliced into SQL.
    pub fn column(&self) -> &'static str {
        match self {
            Self::ActorId => "actor_id",
            Self::ObjectId => "object_id",
            Self::TargetId => "target_id",
            Self::TargetUri => "target_uri",
            Self::OriginId => "origin_id",
            Self::TargetAccountId => "target_account_id",
            Self::ReceivingId => "receiving_id",
        }
    }
}

/// Extracts purge keys from a queued item.
pub trait Keyed {
    fn key(&self, key: QueueKey) -> Option<String>;
}

impl Keyed for Envelope {
    fn key(&self, key: QueueKey) -> Option<String> {
        match key {
            QueueKey::OriginId => Some(self.origin.id.clone()),
            QueueKey::TargetAccountId => self.target.as_ref().map(|a| a.id.clone()),
            QueueKey::ReceivingId => self.receiving.as_ref().map(|a| a.id.clone()),
            QueueKey::TargetUri => self.target_uri.clone(),
            QueueKey::ActorId | QueueKey::ObjectId | QueueKey::TargetId => None,
        }
    }
}

impl Keyed for DeliveryItem {
    fn key(&self, key: QueueKey) -> Option<String> {
        match key {
            QueueKey::ActorId => Some(self.actor_id.clone()),
            QueueKey::ObjectId => self.object_id.clone(),
            QueueKey::TargetId => self.target_id.clone(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
    pub dead: u64,
}

#[derive(Debug)]
pub struct Claimed<T> {
    pub id: String,
    /// Attempts made before this claim.
    pub attempt: u32,
    pub item: T,
}

pub struct WorkQueue<T> {
    db_path: PathBuf,
    name: QueueName,
    notify: Arc<Notify>,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            name: self.name,
            notify: self.notify.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn name(&self) -> QueueName {
        self.name
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Woken on every enqueue.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

impl<T> WorkQueue<T>
where
    T: Serialize + DeserializeOwned + Keyed + Send + 'static,
{
    pub fn open(db_path: impl AsRef<Path>, name: QueueName) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        init_db(&db_path)?;
        Ok(Self {
            db_path,
            name,
            notify: Arc::new(Notify::new()),
            _item: PhantomData,
        })
    }

    pub async fn enqueue(&self, item: &T) -> Result<String> {
        let payload = serde_json::to_string(item).context("encode queue item")?;
        let keys: Vec<Option<String>> = QueueKey::ALL.iter().map(|k| item.key(*k)).collect();
        let id = new_item_id();
        let now = now_ms();
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let queue = self.name.as_str();
            let id = id.clone();
            move || -> Result<()> {
                let conn = open_conn(&db_path)?;
                conn.execute(
                    r#"
                    INSERT INTO work_items (
                      id, queue, status, payload, attempt, next_attempt_at_ms, last_error, created_at_ms,
                      actor_id, object_id, target_id, target_uri, origin_id, target_account_id, receiving_id
                    ) VALUES (?1, ?2, 0, ?3, 0, ?4, NULL, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    "#,
                    params![
                        id, queue, payload, now, keys[0], keys[1], keys[2], keys[3], keys[4],
                        keys[5], keys[6]
                    ],
                )?;
                Ok(())
            }
        })
        .await??;
        self.notify.notify_one();
        Ok(id)
    }

    /// Takes the oldest due pending item and marks it running. Rows whose
    /// payload no longer decodes are marked dead and skipped.
    pub async fn claim(&self) -> Result<Option<Claimed<T>>> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let queue = self.name.as_str();
            move || -> Result<Option<Claimed<T>>> {
                let mut conn = open_conn(&db_path)?;
                loop {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let row: Option<(String, String, u32)> = tx
                        .query_row(
                            r#"
                            SELECT id, payload, attempt FROM work_items
                            WHERE queue = ?1 AND status = 0 AND next_attempt_at_ms <= ?2
                            ORDER BY next_attempt_at_ms ASC, created_at_ms ASC, rowid ASC
                            LIMIT 1
                            "#,
                            params![queue, now_ms()],
                            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                        )
                        .optional()?;
                    let Some((id, payload, attempt)) = row else {
                        tx.commit()?;
                        return Ok(None);
                    };
                    match serde_json::from_str::<T>(&payload) {
                        Ok(item) => {
                            tx.execute(
                                "UPDATE work_items SET status = 3 WHERE id = ?1",
                                params![id],
                            )?;
                            tx.commit()?;
                            return Ok(Some(Claimed { id, attempt, item }));
                        }
                        Err(e) => {
                            warn!("{queue} item {id} undecodable: {e}");
                            tx.execute(
                                "UPDATE work_items SET status = 2, last_error = ?2 WHERE id = ?1",
                                params![id, format!("decode: {e}")],
                            )?;
                            tx.commit()?;
                        }
                    }
                }
            }
        })
        .await?
    }

    pub async fn complete(&self, id: &str) -> Result<()> {
        self.exec(
            "UPDATE work_items SET status = 1, last_error = NULL WHERE id = ?1",
            id,
            None,
        )
        .await
    }

    /// Marks an item dead, keeping the error text.
    pub async fn fail(&self, id: &str, err: &str) -> Result<()> {
        self.exec(
            "UPDATE work_items SET status = 2, last_error = ?2 WHERE id = ?1",
            id,
            Some(err.to_string()),
        )
        .await
    }

    /// Back to pending without counting an attempt, for work interrupted by shutdown.
    pub async fn release(&self, id: &str) -> Result<()> {
        self.exec("UPDATE work_items SET status = 0 WHERE id = ?1", id, None)
            .await?;
        self.notify.notify_one();
        Ok(())
    }

    pub async fn reschedule(&self, id: &str, attempt: u32, delay: Duration, err: &str) -> Result<()> {
        let next = now_ms().saturating_add(delay.as_millis() as i64);
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let id = id.to_string();
            let err = err.to_string();
            move || -> Result<()> {
                let conn = open_conn(&db_path)?;
                conn.execute(
                    "UPDATE work_items SET status = 0, attempt = ?2, next_attempt_at_ms = ?3, last_error = ?4 WHERE id = ?1",
                    params![id, attempt, next, err],
                )?;
                Ok(())
            }
        })
        .await??;
        Ok(())
    }

    /// Items left running by a crash go back to pending.
    pub async fn recover_running(&self) -> Result<u64> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let queue = self.name.as_str();
            move || -> Result<u64> {
                let conn = open_conn(&db_path)?;
                let n = conn.execute(
                    "UPDATE work_items SET status = 0 WHERE queue = ?1 AND status = 3",
                    params![queue],
                )?;
                Ok(n as u64)
            }
        })
        .await?
    }

    /// Deletes pending items whose `key` column equals `value`. Running items
    /// are left alone: their worker already holds them.
    pub async fn purge(&self, key: QueueKey, value: &str) -> Result<u64> {
        if value.is_empty() {
            return Ok(0);
        }
        let n = tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let queue = self.name.as_str();
            let value = value.to_string();
            let sql = format!(
                "DELETE FROM work_items WHERE queue = ?1 AND status = 0 AND {} = ?2",
                key.column()
            );
            move || -> Result<u64> {
                let conn = open_conn(&db_path)?;
                Ok(conn.execute(&sql, params![queue, value])? as u64)
            }
        })
        .await??;
        if n > 0 {
            debug!("{} purge {}: {n} removed", self.name, key.column());
        }
        Ok(n)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let queue = self.name.as_str();
            move || -> Result<QueueStats> {
                let conn = open_conn(&db_path)?;
                let mut stmt = conn.prepare(
                    "SELECT status, COUNT(*) FROM work_items WHERE queue = ?1 GROUP BY status",
                )?;
                let mut rows = stmt.query(params![queue])?;
                let mut out = QueueStats::default();
                while let Some(row) = rows.next()? {
                    let status: i64 = row.get(0)?;
                    let count: u64 = row.get(1)?;
                    match status {
                        0 => out.pending = count,
                        1 => out.done = count,
                        2 => out.dead = count,
                        3 => out.running = count,
                        _ => {}
                    }
                }
                Ok(out)
            }
        })
        .await?
    }

    /// Last error recorded on an item, if any.
    pub async fn last_error(&self, id: &str) -> Result<Option<String>> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let id = id.to_string();
            move || -> Result<Option<String>> {
                let conn = open_conn(&db_path)?;
                let v: Option<Option<String>> = conn
                    .query_row(
                        "SELECT last_error FROM work_items WHERE id = ?1",
                        params![id],
                        |r| r.get(0),
                    )
                    .optional()?;
                Ok(v.flatten())
            }
        })
        .await?
    }

    async fn exec(&self, sql: &'static str, id: &str, err: Option<String>) -> Result<()> {
        tokio::task::spawn_blocking({
            let db_path = self.db_path.clone();
            let id = id.to_string();
            move || -> Result<()> {
                let conn = open_conn(&db_path)?;
                match err {
                    Some(err) => conn.execute(sql, params![id, err])?,
                    None => conn.execute(sql, params![id])?,
                };
                Ok(())
            }
        })
        .await??;
        Ok(())
    }
}

/// The three queues the pipeline runs on, over one database file.
#[derive(Clone)]
pub struct WorkQueues {
    pub client: WorkQueue<Envelope>,
    pub federator: WorkQueue<Envelope>,
    pub delivery: WorkQueue<DeliveryItem>,
}

impl WorkQueues {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        Ok(Self {
            client: WorkQueue::open(db_path, QueueName::Client)?,
            federator: WorkQueue::open(db_path, QueueName::Federator)?,
            delivery: WorkQueue::open(db_path, QueueName::Delivery)?,
        })
    }

    /// Rejects envelopes no client route would accept.
    pub async fn enqueue_client(&self, env: &Envelope) -> Result<String> {
        validate_client(env)?;
        self.client.enqueue(env).await
    }

    pub async fn enqueue_federator(&self, env: &Envelope) -> Result<String> {
        validate_fedi(env)?;
        self.federator.enqueue(env).await
    }

    pub async fn enqueue_delivery(&self, item: &DeliveryItem) -> Result<String> {
        self.delivery.enqueue(item).await
    }

    pub async fn purge(&self, queue: QueueName, key: QueueKey, value: &str) -> Result<u64> {
        match queue {
            QueueName::Client => self.client.purge(key, value).await,
            QueueName::Federator => self.federator.purge(key, value).await,
            QueueName::Delivery => self.delivery.purge(key, value).await,
        }
    }
}

#[async_trait]
impl crate::state::Queues for WorkQueues {
    async fn purge(&self, queue: QueueName, key: QueueKey, value: &str) -> Result<u64> {
        WorkQueues::purge(self, queue, key, value).await
    }

    async fn enqueue_client(&self, envelope: Envelope) -> Result<()> {
        WorkQueues::enqueue_client(self, &envelope).await?;
        Ok(())
    }
}

fn open_conn(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).with_context(|| format!("open db: {}", path.display()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn init_db(path: &Path) -> Result<()> {
    let conn = open_conn(path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS work_items (
          id TEXT PRIMARY KEY,
          queue TEXT NOT NULL,
          status INTEGER NOT NULL,
          payload TEXT NOT NULL,
          attempt INTEGER NOT NULL,
          next_attempt_at_ms INTEGER NOT NULL,
          last_error TEXT NULL,
          created_at_ms INTEGER NOT NULL,
          actor_id TEXT NULL,
          object_id TEXT NULL,
          target_id TEXT NULL,
          target_uri TEXT NULL,
          origin_id TEXT NULL,
          target_account_id TEXT NULL,
          receiving_id TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_work_due ON work_items(queue, status, next_attempt_at_ms);
        CREATE INDEX IF NOT EXISTS idx_work_actor ON work_items(queue, actor_id);
        CREATE INDEX IF NOT EXISTS idx_work_object ON work_items(queue, object_id);
        CREATE INDEX IF NOT EXISTS idx_work_target ON work_items(queue, target_id);
        CREATE INDEX IF NOT EXISTS idx_work_target_uri ON work_items(queue, target_uri);
        CREATE INDEX IF NOT EXISTS idx_work_origin ON work_items(queue, origin_id);
        CREATE INDEX IF NOT EXISTS idx_work_target_account ON work_items(queue, target_account_id);
        CREATE INDEX IF NOT EXISTS idx_work_receiving ON work_items(queue, receiving_id);
        "#,
    )?;
    Ok(())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn new_item_id() -> String {
    let mut b = [0u8; 16];
    OsRng.fill_bytes(&mut b);
    hex::encode(b)
}

pub(crate) fn next_backoff(attempt: u32, base_secs: u64, max_secs: u64) -> Duration {
    let pow = attempt.saturating_sub(1).min(20);
    let mut secs = base_secs.saturating_mul(1u64 << pow);
    if secs > max_secs {
        secs = max_secs;
    }
    // jitter 0..1000ms
    let mut b = [0u8; 2];
    OsRng.fill_bytes(&mut b);
    let jitter_ms = u16::from_le_bytes(b) as u64 % 1000;
    Duration::from_secs(secs) + Duration::from_millis(jitter_ms)
}
