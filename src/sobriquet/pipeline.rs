// src/sobriquet/pipeline.rs

//! The analysis pipeline: bounded job queue, single background consumer, and
//! the prompt-injection read path. Callers construct one pipeline per process
//! and hold a reference; there is no global instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::SobriquetConfig;
use crate::history::{ChatHistory, render_transcript};
use crate::identity::{DisplayNameResolver, PersonResolver, SELF_MARKER};
use crate::llm::TextGenerator;
use crate::profile::{ProfileStore, generate_profile_id, group_key};
use crate::sobriquet::interpreter::ResponseInterpreter;
use crate::sobriquet::prompt::build_mapping_prompt;
use crate::sobriquet::selector::{UserSobriquets, format_injection, select_for_prompt};
use crate::sobriquet::types::AnalysisJob;

/// Queue payload; `None` is the shutdown sentinel that unblocks a consumer
/// parked on an empty queue.
type QueueItem = Option<AnalysisJob>;

pub struct SobriquetPipeline {
    config: SobriquetConfig,
    enabled: bool,
    store: Arc<ProfileStore>,
    generator: Arc<dyn TextGenerator>,
    persons: Arc<dyn PersonResolver>,
    names: Arc<dyn DisplayNameResolver>,
    history: Arc<dyn ChatHistory>,
    job_tx: mpsc::Sender<QueueItem>,
    job_rx: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<QueueItem>>>>,
    stopping: Arc<AtomicBool>,
    /// Jobs dropped at enqueue time because the queue was full.
    dropped: AtomicU64,
    /// Jobs discarded unprocessed during shutdown.
    discarded: Arc<AtomicU64>,
    worker: StdMutex<Option<JoinHandle<()>>>,
}

/// Everything the consumer loop needs, detached from the pipeline handle.
struct ConsumerShared {
    config: SobriquetConfig,
    store: Arc<ProfileStore>,
    generator: Arc<dyn TextGenerator>,
    persons: Arc<dyn PersonResolver>,
    interpreter: ResponseInterpreter,
    stopping: Arc<AtomicBool>,
    discarded: Arc<AtomicU64>,
}

impl SobriquetPipeline {
    /// Configuration is checked once here. An invalid configuration disables
    /// the pipeline for the life of the process: observe and enqueue calls
    /// become no-ops and injection always returns an empty string.
    pub fn new(
        config: SobriquetConfig,
        store: Arc<ProfileStore>,
        generator: Arc<dyn TextGenerator>,
        persons: Arc<dyn PersonResolver>,
        names: Arc<dyn DisplayNameResolver>,
        history: Arc<dyn ChatHistory>,
    ) -> Self {
        let mut enabled = config.enabled;
        if !enabled {
            info!("sobriquet pipeline disabled by configuration");
        } else if let Err(e) = config.validate() {
            error!("sobriquet pipeline disabled: {e}");
            enabled = false;
        }
        if enabled && config.is_default_salt() {
            warn!(
                "profile id salt is the built-in default; rotating it later orphans all records"
            );
        }

        let (job_tx, job_rx) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            config,
            enabled,
            store,
            generator,
            persons,
            names,
            history,
            job_tx,
            job_rx: Arc::new(tokio::sync::Mutex::new(Some(job_rx))),
            stopping: Arc::new(AtomicBool::new(false)),
            dropped: AtomicU64::new(0),
            discarded: Arc::new(AtomicU64::new(0)),
            worker: StdMutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Jobs dropped because the queue was at capacity.
    pub fn dropped_jobs(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Jobs discarded unprocessed during shutdown.
    pub fn discarded_jobs(&self) -> u64 {
        self.discarded.load(Ordering::SeqCst)
    }

    /// Starts the background consumer. Starting while one is already running
    /// is a no-op.
    pub fn start(&self) {
        if !self.enabled {
            info!("sobriquet pipeline disabled; consumer not started");
            return;
        }

        let mut guard = self.worker.lock().unwrap();
        if let Some(handle) = guard.as_ref()
            && !handle.is_finished()
        {
            warn!("sobriquet consumer already running");
            return;
        }

        self.stopping.store(false, Ordering::SeqCst);
        let shared = ConsumerShared {
            config: self.config.clone(),
            store: self.store.clone(),
            generator: self.generator.clone(),
            persons: self.persons.clone(),
            interpreter: ResponseInterpreter::new(&self.config),
            stopping: self.stopping.clone(),
            discarded: self.discarded.clone(),
        };
        *guard = Some(tokio::spawn(consume(shared, self.job_rx.clone())));
        info!("sobriquet consumer started");
    }

    /// Signals the consumer to stop, unblocks it if parked, and waits up to
    /// the configured shutdown timeout. Jobs still queued are discarded, not
    /// processed. Stopping a pipeline that is not running is a no-op.
    pub async fn stop(&self) {
        let handle = self.worker.lock().unwrap().take();
        let Some(mut handle) = handle else {
            info!("sobriquet consumer not running");
            return;
        };

        self.stopping.store(true, Ordering::SeqCst);
        // Best effort: a full queue just means the consumer will notice the
        // stop flag on its next poll timeout instead.
        let _ = self.job_tx.try_send(None);

        match timeout(self.config.shutdown_timeout, &mut handle).await {
            Ok(_) => info!("sobriquet consumer stopped"),
            Err(_) => {
                warn!(
                    "sobriquet consumer did not stop within {:?}; abandoning it",
                    self.config.shutdown_timeout
                );
                handle.abort();
            }
        }
    }

    /// Non-blocking enqueue. At capacity the newest job is dropped and the
    /// condition logged; during shutdown jobs are silently dropped.
    pub fn enqueue(&self, job: AnalysisJob) {
        if !self.enabled {
            return;
        }
        if self.stopping.load(Ordering::SeqCst) {
            debug!(
                "[{}:{}] pipeline stopping; analysis job dropped",
                job.platform, job.group_id
            );
            return;
        }

        match self.job_tx.try_send(Some(job)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                warn!("sobriquet queue full; analysis job dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("sobriquet queue closed; analysis job dropped");
            }
        }
    }

    /// Observe one chat turn: snapshot recent history, resolve display names,
    /// and queue an analysis job. Subject to the analysis-probability gate.
    /// Never blocks on the consumer.
    pub async fn observe_turn(
        &self,
        platform: &str,
        group_id: &str,
        bot_reply: &[String],
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut probability = self.config.analysis_probability;
        if !(0.0..=1.0).contains(&probability) {
            probability = 1.0;
        }
        if rand::random::<f64>() > probability {
            debug!("[{platform}:{group_id}] skipping analysis (probability gate)");
            return Ok(());
        }

        let messages = self
            .history
            .recent_messages(platform, group_id, Utc::now(), self.config.history_limit)
            .await
            .context("history lookup failed")?;
        if messages.is_empty() {
            debug!("[{platform}:{group_id}] no history to analyze");
            return Ok(());
        }

        let mut user_ids: Vec<String> = Vec::new();
        for msg in &messages {
            if !msg.user_id.is_empty() && !user_ids.contains(&msg.user_id) {
                user_ids.push(msg.user_id.clone());
            }
        }

        let mut display_names = match self.names.display_names(platform, &user_ids).await {
            Ok(map) => map,
            Err(e) => {
                error!("[{platform}:{group_id}] display name lookup failed: {e:#}");
                HashMap::new()
            }
        };
        for user_id in &user_ids {
            let latest_in_history = messages
                .iter()
                .rev()
                .find(|msg| &msg.user_id == user_id)
                .and_then(|msg| msg.display_name.clone());

            if *user_id == self.config.bot_user_id {
                // Always label our own entry so the interpreter's self veto
                // works from the display name alone.
                let base = display_names
                    .get(user_id)
                    .cloned()
                    .or(latest_in_history)
                    .unwrap_or_else(|| self.config.bot_display_name.clone());
                display_names.insert(user_id.clone(), format!("{base}{SELF_MARKER}"));
            } else if !display_names.contains_key(user_id) {
                let fallback = latest_in_history.unwrap_or_else(|| placeholder_name(user_id));
                display_names.insert(user_id.clone(), fallback);
            }
        }

        let job = AnalysisJob {
            transcript: render_transcript(&messages, Utc::now()),
            bot_reply: bot_reply.join(" "),
            platform: platform.to_string(),
            group_id: group_id.to_string(),
            display_names,
        };
        self.enqueue(job);
        Ok(())
    }

    /// Render the nickname block for a prompt, for the given in-context
    /// users. Every failure and every absence degrades to an empty string;
    /// nothing user-visible ever errors here.
    pub async fn prompt_injection(
        &self,
        platform: &str,
        group_id: &str,
        user_ids: &[String],
    ) -> String {
        if !self.enabled || user_ids.is_empty() {
            return String::new();
        }
        match self.injection_candidates(platform, group_id, user_ids).await {
            Ok(users) => {
                let selected = select_for_prompt(
                    &users,
                    self.config.max_in_prompt,
                    self.config.probability_smoothing,
                );
                format_injection(&selected)
            }
            Err(e) => {
                error!("[{platform}:{group_id}] nickname injection failed: {e:#}");
                String::new()
            }
        }
    }

    async fn injection_candidates(
        &self,
        platform: &str,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<UserSobriquets>> {
        let key = group_key(platform, group_id);
        let display_names = self
            .names
            .display_names(platform, user_ids)
            .await
            .context("display name lookup failed")?;

        let mut users: Vec<UserSobriquets> = Vec::new();
        for user_id in user_ids {
            if users.iter().any(|u| &u.user_id == user_id) {
                continue;
            }
            let Some(person_key) = self
                .persons
                .resolve_person_key(platform, user_id)
                .await
                .context("person key lookup failed")?
            else {
                continue;
            };
            let profile_id = generate_profile_id(&self.config.profile_id_salt, &person_key);
            let sobriquets = self.store.group_sobriquets(&profile_id, &key).await?;
            if sobriquets.is_empty() {
                continue;
            }
            let Some(display_name) = display_names.get(user_id) else {
                continue;
            };
            users.push(UserSobriquets {
                display_name: display_name.clone(),
                user_id: user_id.clone(),
                sobriquets,
            });
        }
        Ok(users)
    }
}

/// The consumer loop: waits for jobs with a bounded timeout, processes one
/// job fully before the next, and survives per-job failures with a backoff.
/// Exits on the shutdown sentinel, a closed queue, or the stop flag; whatever
/// is still queued afterwards is drained into the discard counter.
async fn consume(
    shared: ConsumerShared,
    rx_slot: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<QueueItem>>>>,
) {
    // Holding the receiver's lock for the lifetime of the loop is what makes
    // a second concurrent consumer impossible.
    let mut guard = rx_slot.lock().await;
    let Some(rx) = guard.as_mut() else {
        error!("sobriquet job queue receiver is gone");
        return;
    };

    info!("sobriquet consumer loop started");
    loop {
        match timeout(shared.config.poll_interval, rx.recv()).await {
            Err(_) => {
                if shared.stopping.load(Ordering::SeqCst) {
                    break;
                }
            }
            Ok(None) => {
                debug!("sobriquet job queue closed");
                break;
            }
            Ok(Some(None)) => {
                debug!("shutdown sentinel received");
                break;
            }
            Ok(Some(Some(job))) => {
                if shared.stopping.load(Ordering::SeqCst) {
                    shared.discarded.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                if let Err(e) = process_job(&shared, &job).await {
                    error!(
                        "[{}:{}] sobriquet analysis failed: {e:#}",
                        job.platform, job.group_id
                    );
                    if shared.stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    tokio::time::sleep(shared.config.error_backoff).await;
                }
            }
        }
    }

    while let Ok(item) = rx.try_recv() {
        if item.is_some() {
            shared.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }
    info!(
        "sobriquet consumer loop ended ({} job(s) discarded)",
        shared.discarded.load(Ordering::SeqCst)
    );
}

/// One job end to end: model call, interpretation, store updates. Errors
/// abandon the job (at-most-once); an absent person key only skips its entry.
async fn process_job(shared: &ConsumerShared, job: &AnalysisJob) -> Result<()> {
    let prompt = build_mapping_prompt(&job.transcript, &job.bot_reply, &job.display_names);
    let raw = shared
        .generator
        .generate(&prompt)
        .await
        .context("mapping model call failed")?;

    let result = shared.interpreter.interpret(&raw, &job.display_names);
    if !result.exists {
        debug!(
            "[{}:{}] no reliable nickname mapping found",
            job.platform, job.group_id
        );
        return Ok(());
    }

    for (user_id, nickname) in &result.mapping {
        let person_key = shared
            .persons
            .resolve_person_key(&job.platform, user_id)
            .await
            .context("person key lookup failed")?;
        let Some(person_key) = person_key else {
            warn!(
                "[{}:{}] no person key for user {user_id}; skipping nickname '{nickname}'",
                job.platform, job.group_id
            );
            continue;
        };

        let profile_id = generate_profile_id(&shared.config.profile_id_salt, &person_key);
        shared
            .store
            .ensure_profile_exists(&profile_id, &person_key, Some((&job.platform, user_id)))
            .await
            .context("profile creation failed")?;
        let counted = shared
            .store
            .increment_sobriquet_count(&profile_id, &job.platform, &job.group_id, nickname)
            .await
            .context("sobriquet count update failed")?;
        if counted {
            info!(
                "[{}:{}] counted nickname '{nickname}' for user {user_id}",
                job.platform, job.group_id
            );
        }
    }
    Ok(())
}

/// Anonymous stand-in shown when no display name is known for a user.
fn placeholder_name(user_id: &str) -> String {
    let chars: Vec<char> = user_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("user({tail})")
}
