pub mod view;


use crate::app::config::AppConfig;
use crate::app::time::Clock;
use crate::error::SyncError;
use crate::shared::names::sanitize_player_name;
use crate::store::{wait_for_change, with_retry, PresenceEntry, RemoteStore, RetryPolicy};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
pub use view::PresenceView;

#[derive(Debug, Clone)]
pub struct PresenceOptions {
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    /// Records older than this are hidden and swept.
    pub stale_after: Duration,
    pub sweep_interval: Duration,
    /// Window in which a repeated, unchanged announce is skipped.
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

impl PresenceOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            heartbeat_interval: config.presence.heartbeat_interval,
            poll_interval: config.leaderboard.refresh_interval,
            stale_after: config.presence.active_window,
            sweep_interval: config.presence.sweep_interval,
            debounce: Duration::from_secs(2),
            retry: RetryPolicy::from(&config.network),
        }
    }
}

impl Default for PresenceOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            debounce: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct OwnRecord {
    entry: PresenceEntry,
    written_at: Option<i64>,
}

#[derive(Debug, Default)]
struct PresenceTasks {
    heartbeat: Option<JoinHandle<()>>,
    feed: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

/// Who is online, from one player's point of view.
///
/// Background tasks only hold a weak handle, so dropping the last `Arc`
/// stops them.
///
/// Owns this player's presence record (announce, status, heartbeat, leave)
/// and a sorted view of everyone else, refreshed from store pushes when the
/// store has them and by polling otherwise. Every background task can be
/// stopped any number of times.
pub struct PresenceClient {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    options: PresenceOptions,
    own: Mutex<Option<OwnRecord>>,
    view: watch::Sender<PresenceView>,
    tasks: std::sync::Mutex<PresenceTasks>,
}

impl PresenceClient {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, options: PresenceOptions) -> Self {
        let (view, _) = watch::channel(PresenceView::default());
        Self {
            store,
            clock,
            options,
            own: Mutex::new(None),
            view,
            tasks: std::sync::Mutex::new(PresenceTasks::default()),
        }
    }

    /// Marks the player online and playing. Returns `Ok(false)` when the same
    /// record was written within the debounce window.
    pub async fn announce(&self, player_id: &str, username: &str) -> Result<bool, SyncError> {
        let player_id = player_id.trim();
        if player_id.is_empty() {
            return Err(SyncError::Validation("player id is required".to_string()));
        }
        let username = sanitize_player_name(username, "");
        if username.is_empty() {
            return Err(SyncError::Validation("username is required".to_string()));
        }

        let now = self.clock.now_millis();
        let mut own = self.own.lock().await;
        if let Some(record) = own.as_ref() {
            let unchanged =
                record.entry.player_id == player_id && record.entry.username == username && record.entry.is_playing;
            let recent = record
                .written_at
                .is_some_and(|at| now - at < self.options.debounce.as_millis() as i64);
            if unchanged && recent {
                tracing::debug!(player_id, "announce debounced");
                return Ok(false);
            }
        }

        let previous = own
            .as_ref()
            .map(|record| record.entry.player_id.clone())
            .filter(|previous| previous != player_id);
        if let Some(previous) = previous {
            if let Err(error) = self.remove_remote(&previous).await {
                tracing::warn!(?error, player_id = %previous, "failed to drop previous presence record");
            }
            self.apply_local(|entries| entries.retain(|entry| entry.player_id != previous));
        }

        let entry = PresenceEntry {
            player_id: player_id.to_string(),
            username,
            last_active_at: now,
            is_playing: true,
        };
        let record = own.insert(OwnRecord {
            entry: entry.clone(),
            written_at: None,
        });
        self.write(&entry).await?;
        record.written_at = Some(now);

        match self.store.on_disconnect_cleanup(player_id).await {
            Ok(true) => tracing::debug!(player_id, "disconnect cleanup registered"),
            Ok(false) => {}
            Err(error) => tracing::warn!(?error, player_id, "failed to register disconnect cleanup"),
        }
        drop(own);

        self.apply_local(|entries| upsert_entry(entries, entry));
        tracing::info!(player_id, store = self.store.name(), "presence announced");
        Ok(true)
    }

    /// Updates the playing flag of this player's own record.
    pub async fn set_playing(&self, is_playing: bool) -> Result<(), SyncError> {
        let now = self.clock.now_millis();
        let mut own = self.own.lock().await;
        let Some(record) = own.as_mut() else {
            return Err(SyncError::Validation("presence must be announced first".to_string()));
        };
        record.entry.is_playing = is_playing;
        record.entry.last_active_at = now;
        let entry = record.entry.clone();
        self.write(&entry).await?;
        record.written_at = Some(now);
        drop(own);

        self.apply_local(|entries| upsert_entry(entries, entry));
        Ok(())
    }

    /// Refreshes the timestamp of this player's record. No-op before announce.
    pub async fn heartbeat(&self) -> Result<(), SyncError> {
        let now = self.clock.now_millis();
        let mut own = self.own.lock().await;
        let Some(record) = own.as_mut() else {
            return Ok(());
        };
        record.entry.last_active_at = now;
        let entry = record.entry.clone();
        self.write(&entry).await?;
        record.written_at = Some(now);
        Ok(())
    }

    /// Removes the record and stops the heartbeat.
    pub async fn leave(&self, player_id: &str) -> Result<(), SyncError> {
        self.stop_heartbeat();
        {
            let mut own = self.own.lock().await;
            if own.as_ref().is_some_and(|record| record.entry.player_id == player_id) {
                *own = None;
            }
        }
        self.apply_local(|entries| entries.retain(|entry| entry.player_id != player_id));
        self.remove_remote(player_id).await?;
        tracing::info!(player_id, "presence left");
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<PresenceView> {
        self.view.subscribe()
    }

    /// Calls `callback(count, entries)` each time the visible presence set
    /// changes. Identical consecutive views are never delivered.
    pub fn on_change<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(usize, &[PresenceEntry]) + Send + 'static,
    {
        let mut receiver = self.view.subscribe();
        tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let view = receiver.borrow_and_update().clone();
                callback(view.count, &view.entries);
            }
        })
    }

    pub fn active_count(&self) -> usize {
        self.view.borrow().count
    }

    pub fn current(&self) -> PresenceView {
        self.view.borrow().clone()
    }

    /// Re-reads the presence set from the store.
    pub async fn refresh(&self) -> Result<PresenceView, SyncError> {
        let store = self.store.as_ref();
        let entries = with_retry(self.options.retry, "presence fetch", move || store.list_presence()).await?;
        let view = view::build_view(entries, self.cutoff());
        self.publish(view.clone());
        Ok(view)
    }

    /// Deletes stale records from the store, then refreshes the view.
    pub async fn sweep_stale(&self) -> Result<usize, SyncError> {
        let store = self.store.as_ref();
        let cutoff = self.cutoff();
        let removed = with_retry(self.options.retry, "presence sweep", move || store.sweep_presence(cutoff)).await?;
        if removed > 0 {
            tracing::debug!(removed, "swept stale presence records");
        }
        self.refresh().await?;
        Ok(removed)
    }

    /// Heartbeat, feed and sweeper together.
    pub fn start(self: &Arc<Self>) {
        self.start_heartbeat();
        self.start_feed();
        self.start_sweeper();
    }

    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in [tasks.heartbeat.take(), tasks.feed.take(), tasks.sweeper.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }

    pub fn start_heartbeat(self: &Arc<Self>) {
        let client = Arc::downgrade(self);
        let period = self.options.heartbeat_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(client) = client.upgrade() else { break };
                if let Err(error) = client.heartbeat().await {
                    tracing::warn!(?error, "presence heartbeat failed");
                }
            }
        });
        self.replace_task(|tasks| &mut tasks.heartbeat, task);
    }

    pub fn stop_heartbeat(&self) {
        self.take_task(|tasks| &mut tasks.heartbeat);
    }

    pub fn is_heartbeat_running(&self) -> bool {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.heartbeat.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn start_feed(self: &Arc<Self>) {
        let client = Arc::downgrade(self);
        let mut changes = self.store.subscribe();
        let poll_interval = self.options.poll_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let store_alive = tokio::select! {
                    _ = interval.tick() => true,
                    alive = wait_for_change(&mut changes) => alive,
                };
                if !store_alive {
                    changes = None;
                }
                let Some(client) = client.upgrade() else { break };
                if let Err(error) = client.refresh().await {
                    tracing::warn!(?error, store = client.store.name(), "presence refresh failed");
                }
            }
        });
        self.replace_task(|tasks| &mut tasks.feed, task);
    }

    pub fn start_sweeper(self: &Arc<Self>) {
        let client = Arc::downgrade(self);
        let sweep_interval = self.options.sweep_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(client) = client.upgrade() else { break };
                if let Err(error) = client.sweep_stale().await {
                    tracing::warn!(?error, "presence sweep failed");
                }
            }
        });
        self.replace_task(|tasks| &mut tasks.sweeper, task);
    }

    async fn write(&self, entry: &PresenceEntry) -> Result<(), SyncError> {
        let store = self.store.as_ref();
        with_retry(self.options.retry, "presence write", move || store.set_presence(entry.clone())).await
    }

    async fn remove_remote(&self, player_id: &str) -> Result<(), SyncError> {
        let store = self.store.as_ref();
        with_retry(self.options.retry, "presence removal", move || store.remove_presence(player_id)).await
    }

    fn cutoff(&self) -> i64 {
        self.clock.now_millis() - self.options.stale_after.as_millis() as i64
    }

    fn apply_local(&self, update: impl FnOnce(&mut Vec<PresenceEntry>)) {
        let mut entries = self.view.borrow().entries.clone();
        update(&mut entries);
        self.publish(view::build_view(entries, self.cutoff()));
    }

    fn publish(&self, next: PresenceView) {
        self.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn replace_task(&self, slot: impl FnOnce(&mut PresenceTasks) -> &mut Option<JoinHandle<()>>, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot(&mut *tasks).replace(task) {
            previous.abort();
        }
    }

    fn take_task(&self, slot: impl FnOnce(&mut PresenceTasks) -> &mut Option<JoinHandle<()>>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = slot(&mut *tasks).take() {
            task.abort();
        }
    }
}

impl Drop for PresenceClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn upsert_entry(entries: &mut Vec<PresenceEntry>, entry: PresenceEntry) {
    match entries.iter_mut().find(|existing| existing.player_id == entry.player_id) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}
