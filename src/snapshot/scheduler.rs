//! Auto-save scheduling: a periodic timer plus a change-volume trigger.
//!
//! [`AutoSaveScheduler`] is a two-state machine (`stopped ⇄ running`). When
//! running it owns a background task that ticks every interval and asks its
//! [`AutoSaveTarget`] to save. The task holds only a weak reference to the
//! target, so dropping the store ends the loop.
//!
//! [`ChangeTracker`] counts significant file saves independently of the
//! timer and reports when enough changes have accumulated.

use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::providers::BoxFuture;
use crate::{AppError, Result};

/// Something that can take an auto-save on demand.
pub trait AutoSaveTarget: Send + Sync + 'static {
    /// Take an auto-save now.
    ///
    /// Returns the new snapshot id, or `None` when the save was skipped
    /// (for example because a restore is running).
    ///
    /// # Errors
    ///
    /// Returns an error if the save failed; the scheduler logs and continues.
    fn auto_save(&self) -> BoxFuture<'_, Result<Option<String>>>;
}

/// Running-state bookkeeping for the timer task.
struct TimerHandle {
    interval: Duration,
    cancel: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl Drop for TimerHandle {
    /// Cancel the background timer when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Periodic auto-save timer.
#[derive(Default)]
pub struct AutoSaveScheduler {
    timer: Option<TimerHandle>,
}

impl AutoSaveScheduler {
    /// A scheduler in the `stopped` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `running` with the given period, replacing any running timer.
    ///
    /// The first firing happens one full `interval` after the call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `interval` is zero or no tokio runtime
    /// is available to host the timer task.
    pub fn start<T: AutoSaveTarget>(&mut self, target: Weak<T>, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(AppError::Config(
                "auto-save interval must be greater than zero".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| AppError::Config(format!("auto-save needs a tokio runtime: {err}")))?;

        self.stop();

        let cancel = CancellationToken::new();
        let join_handle = runtime.spawn(
            run_timer(target, interval, cancel.clone())
                .instrument(info_span!("auto_save_timer", interval_secs = interval.as_secs())),
        );

        info!(interval_secs = interval.as_secs(), "auto-save timer started");
        self.timer = Some(TimerHandle {
            interval,
            cancel,
            join_handle,
        });
        Ok(())
    }

    /// Enter `stopped`, cancelling the pending timer immediately.
    ///
    /// A save already in flight is allowed to finish.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
            info!("auto-save timer stopped");
        }
    }

    /// Whether the timer is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|timer| !timer.join_handle.is_finished())
    }

    /// Period of the running timer, if any.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.timer.as_ref().map(|timer| timer.interval)
    }
}

async fn run_timer<T: AutoSaveTarget>(
    target: Weak<T>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("auto-save timer cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let Some(target) = target.upgrade() else {
            debug!("auto-save target dropped; timer exiting");
            return;
        };

        match target.auto_save().await {
            Ok(Some(snapshot_id)) => debug!(snapshot_id, "scheduled auto-save completed"),
            Ok(None) => debug!("scheduled auto-save skipped"),
            Err(err) => error!(%err, "scheduled auto-save failed"),
        }
    }
}

#[derive(Debug, Default)]
struct ChangeState {
    count: u32,
    last_change_at: Option<i64>,
}

/// Counts significant file-save events for the change-volume trigger.
///
/// The trigger fires once `threshold` changes have accumulated and the
/// latest change arrived at least `cooldown` after the previous one.
#[derive(Debug)]
pub struct ChangeTracker {
    threshold: u32,
    cooldown_ms: i64,
    state: Mutex<ChangeState>,
}

impl ChangeTracker {
    /// Construct a tracker.
    #[must_use]
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown_ms: i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX),
            state: Mutex::new(ChangeState::default()),
        }
    }

    /// Count a change observed at `now_ms`.
    ///
    /// When `armed` is false (auto-save stopped) the change is only counted.
    /// Returns `true` when an auto-save should fire; the counter is reset in
    /// that case.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the tracker mutex is poisoned.
    pub fn record_at(&self, now_ms: i64, armed: bool) -> Result<bool> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AppError::Config("change tracker mutex poisoned".into()))?;

        let since_previous = state
            .last_change_at
            .map_or(i64::MAX, |previous| now_ms.saturating_sub(previous));
        state.count = state.count.saturating_add(1);
        state.last_change_at = Some(now_ms);

        if armed && state.count >= self.threshold && since_previous >= self.cooldown_ms {
            debug!(count = state.count, "change-volume threshold reached");
            state.count = 0;
            return Ok(true);
        }
        Ok(false)
    }

    /// Changes counted since the last trigger.
    #[must_use]
    pub fn pending_changes(&self) -> u32 {
        self.state.lock().map_or(0, |state| state.count)
    }

    /// Forget accumulated changes.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.count = 0;
        }
    }
}
