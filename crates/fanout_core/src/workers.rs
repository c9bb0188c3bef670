/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Worker pools draining the three queues.

use crate::dispatch::Processor;
use crate::error::ProcessError;
use crate::locks::{KeyedLocks, DEFAULT_SHARDS};
use crate::work_queue::{next_backoff, Claimed, QueueName, WorkQueue, WorkQueues};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fanout_protocol::{DeliveryItem, Envelope};
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw worker configuration, usually read from JSON. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkersConfig {
    pub data_dir: Option<String>,
    pub queue_db_path: Option<String>,
    pub client_workers: Option<usize>,
    pub federator_workers: Option<usize>,
    pub delivery_workers: Option<usize>,
    pub handler_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub max_delivery_attempts: Option<u32>,
    pub base_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub lock_shards: Option<usize>,
}

impl WorkersConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse workers config")
    }

    pub fn settings(&self) -> QueueSettings {
        let d = QueueSettings::default();
        let workers = |v: Option<usize>, def: usize| v.unwrap_or(def).clamp(1, 64);
        let base_backoff_secs = self
            .base_backoff_secs
            .unwrap_or(d.base_backoff_secs)
            .clamp(1, 3600);
        QueueSettings {
            client_workers: workers(self.client_workers, d.client_workers),
            federator_workers: workers(self.federator_workers, d.federator_workers),
            delivery_workers: workers(self.delivery_workers, d.delivery_workers),
            handler_timeout: self
                .handler_timeout_secs
                .map(|s| Duration::from_secs(s.clamp(1, 3600)))
                .unwrap_or(d.handler_timeout),
            poll_interval: self
                .poll_interval_ms
                .map(|ms| Duration::from_millis(ms.clamp(50, 60_000)))
                .unwrap_or(d.poll_interval),
            max_delivery_attempts: self
                .max_delivery_attempts
                .unwrap_or(d.max_delivery_attempts)
                .clamp(1, 100),
            base_backoff_secs,
            max_backoff_secs: self
                .max_backoff_secs
                .unwrap_or(d.max_backoff_secs)
                .clamp(base_backoff_secs, 7 * 24 * 3600),
            lock_shards: self.lock_shards.unwrap_or(d.lock_shards).clamp(1, 1024),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        if let Some(p) = self.queue_db_path.as_deref().filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(p);
        }
        let dir = self
            .data_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(".");
        PathBuf::from(dir).join("fanout_queue.db")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub client_workers: usize,
    pub federator_workers: usize,
    pub delivery_workers: usize,
    pub handler_timeout: Duration,
    pub poll_interval: Duration,
    pub max_delivery_attempts: u32,
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub lock_shards: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            client_workers: 4,
            federator_workers: 4,
            delivery_workers: 4,
            handler_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            max_delivery_attempts: 10,
            base_backoff_secs: 5,
            max_backoff_secs: 3600,
            lock_shards: DEFAULT_SHARDS,
        }
    }
}

impl QueueSettings {
    /// Lock registry sized for these settings, for building a `State`.
    pub fn keyed_locks(&self) -> KeyedLocks {
        KeyedLocks::new(self.lock_shards)
    }
}

/// Sends a prepared delivery item to its remote inbox.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, item: &DeliveryItem) -> Result<()>;
}

pub fn init_tracing() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}

#[derive(Clone, Copy)]
enum Side {
    Client,
    Federator,
}

pub struct Workers {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    queues: WorkQueues,
}

impl Workers {
    /// Spawns the pools on the current runtime. Items a previous run left
    /// running are returned to pending first. Without a deliverer the
    /// delivery queue only accumulates.
    pub async fn start(
        settings: QueueSettings,
        queues: WorkQueues,
        processor: Processor,
        deliverer: Option<Arc<dyn Deliverer>>,
    ) -> Result<Self> {
        init_tracing();
        info!("work queue db: {}", queues.client.db_path().display());

        let recovered = queues.client.recover_running().await?
            + queues.federator.recover_running().await?
            + queues.delivery.recover_running().await?;
        if recovered > 0 {
            info!("recovered {recovered} interrupted items");
        }

        let shutdown = CancellationToken::new();
        let mut handles = Vec::new();

        for (side, queue, count) in [
            (Side::Client, &queues.client, settings.client_workers),
            (Side::Federator, &queues.federator, settings.federator_workers),
        ] {
            for _ in 0..count {
                handles.push(tokio::spawn(envelope_loop(
                    side,
                    queue.clone(),
                    processor.clone(),
                    settings,
                    shutdown.clone(),
                )));
            }
        }

        match deliverer {
            Some(deliverer) => {
                for _ in 0..settings.delivery_workers {
                    handles.push(tokio::spawn(delivery_loop(
                        queues.delivery.clone(),
                        deliverer.clone(),
                        settings,
                        shutdown.clone(),
                    )));
                }
            }
            None => warn!("no deliverer configured; delivery queue is not drained"),
        }

        Ok(Self {
            shutdown,
            handles,
            queues,
        })
    }

    pub fn queues(&self) -> &WorkQueues {
        &self.queues
    }

    /// Cancels in-flight handlers, wakes idle workers and waits for all of them.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.queues.client.notifier().notify_waiters();
        self.queues.federator.notifier().notify_waiters();
        self.queues.delivery.notifier().notify_waiters();
        for res in futures_util::future::join_all(self.handles).await {
            if let Err(e) = res {
                warn!("worker task ended abnormally: {e}");
            }
        }
        info!("workers stopped");
    }
}

async fn idle<T>(queue: &WorkQueue<T>, tick: Duration, shutdown: &CancellationToken) {
    let notify = queue.notifier();
    tokio::select! {
        _ = notify.notified() => {}
        _ = tokio::time::sleep(tick) => {}
        _ = shutdown.cancelled() => {}
    }
}

async fn envelope_loop(
    side: Side,
    queue: WorkQueue<Envelope>,
    processor: Processor,
    settings: QueueSettings,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let job = match queue.claim().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                idle(&queue, settings.poll_interval, &shutdown).await;
                continue;
            }
            Err(e) => {
                warn!("{} claim failed: {e:#}", queue.name());
                idle(&queue, settings.poll_interval, &shutdown).await;
                continue;
            }
        };
        if let Err(e) = run_envelope(side, &queue, &processor, &settings, &shutdown, job).await {
            warn!("{} item bookkeeping failed: {e:#}", queue.name());
        }
    }
}

async fn run_envelope(
    side: Side,
    queue: &WorkQueue<Envelope>,
    processor: &Processor,
    settings: &QueueSettings,
    shutdown: &CancellationToken,
    job: Claimed<Envelope>,
) -> Result<()> {
    let cancel = shutdown.child_token();
    let env = &job.item;
    let fut = async {
        match side {
            Side::Client => processor.process_from_client(env, &cancel).await,
            Side::Federator => processor.process_from_fedi(env, &cancel).await,
        }
    };
    let res = tokio::time::timeout(settings.handler_timeout, fut).await;
    cancel.cancel();

    match res {
        Ok(Ok(outcome)) => {
            if !outcome.is_clean() {
                debug!(
                    handler = outcome.handler,
                    failures = outcome.failures.len(),
                    "completed with tolerated failures"
                );
            }
            queue.complete(&job.id).await
        }
        Ok(Err(ProcessError::Cancelled)) if shutdown.is_cancelled() => {
            queue.release(&job.id).await
        }
        Ok(Err(e)) => {
            warn!(
                queue = %queue.name(),
                verb = %env.verb,
                object_type = %env.object_type,
                "processing failed: {e}"
            );
            queue.fail(&job.id, &e.to_string()).await
        }
        Err(_) => {
            let msg = format!(
                "handler timed out after {}s",
                settings.handler_timeout.as_secs()
            );
            warn!(queue = %queue.name(), verb = %env.verb, object_type = %env.object_type, "{msg}");
            queue.fail(&job.id, &msg).await
        }
    }
}

async fn delivery_loop(
    queue: WorkQueue<DeliveryItem>,
    deliverer: Arc<dyn Deliverer>,
    settings: QueueSettings,
    shutdown: CancellationToken,
) {
    debug_assert_eq!(queue.name(), QueueName::Delivery);
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let job = match queue.claim().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                idle(&queue, settings.poll_interval, &shutdown).await;
                continue;
            }
            Err(e) => {
                warn!("delivery claim failed: {e:#}");
                idle(&queue, settings.poll_interval, &shutdown).await;
                continue;
            }
        };
        if let Err(e) = run_delivery(&queue, deliverer.as_ref(), &settings, &shutdown, job).await {
            warn!("delivery bookkeeping failed: {e:#}");
        }
    }
}

async fn run_delivery(
    queue: &WorkQueue<DeliveryItem>,
    deliverer: &dyn Deliverer,
    settings: &QueueSettings,
    shutdown: &CancellationToken,
    job: Claimed<DeliveryItem>,
) -> Result<()> {
    let res = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return queue.release(&job.id).await,
        r = tokio::time::timeout(settings.handler_timeout, deliverer.deliver(&job.item)) => r,
    };
    let err = match res {
        Ok(Ok(())) => return queue.complete(&job.id).await,
        Ok(Err(e)) => format!("{e:#}"),
        Err(_) => "delivery timed out".to_string(),
    };

    let attempt_no = job.attempt.saturating_add(1);
    if attempt_no >= settings.max_delivery_attempts {
        warn!(
            "delivery to {} dead after {attempt_no} attempts: {err}",
            job.item.inbox
        );
        return queue.fail(&job.id, &err).await;
    }
    let delay = next_backoff(
        attempt_no,
        settings.base_backoff_secs,
        settings.max_backoff_secs,
    );
    debug!(
        "delivery to {} failed (attempt {attempt_no}), retry in {}s: {err}",
        job.item.inbox,
        delay.as_secs()
    );
    queue.reschedule(&job.id, attempt_no, delay, &err).await
}
