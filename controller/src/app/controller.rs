//! Batch lifecycle control (non-HTTP). This module owns every state transition of
//! batches and of the machine state singleton.
//!
//! At most one batch is in flight (`Ongoing` or `Paused`) and
//! [`MachineState::active_batch_id`] points at it or is empty. Every operation that
//! reads or writes the machine state runs under the machine gate, starting with
//! [`LineController::reconcile`], so concurrent requests cannot interleave their
//! read-modify-write cycles. The rows an operation writes are committed in one
//! transaction; device dispatch and change notifications only follow a commit.

use alloc::sync::Arc;

use chrono::Utc;
use sqlx::SqliteConnection;
use thiserror::Error as ThisError;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, warn};

use crate::app::{
    ConfigRx,
    db::{self, DbPool},
    device::DeviceLink,
    liveness::{self, LivenessReport},
    model::{
        Batch, BatchStatus, DeviceSignal, HeartbeatRecord, InvalidTransition, MachineState,
        NewBatch, ResourceUpdate,
    },
};
use potline_common::HeartbeatReport;

/// Why an otherwise valid request cannot be carried out right now.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Conflict {
    #[error("A batch is already in progress.")]
    BatchInProgress,
    #[error("Cannot start: Supplies are low.")]
    SuppliesLow,
    #[error("This batch is already complete.")]
    AlreadyComplete,
    #[error("Batch cannot be cancelled, status is: {0}")]
    NotCancellable(BatchStatus),
    #[error("Cannot delete an active batch. Please cancel it first.")]
    ActiveBatch,
}

/// Errors returned by batch lifecycle operations.
#[derive(Debug, ThisError)]
pub enum ControlError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Conflict(#[from] Conflict),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("Batch not found: {0}")]
    NotFound(String),
    #[error("Storage failure")]
    Store(#[from] sqlx::Error),
}

/// Change notifications for batches, consumed by the websocket stream.
#[derive(Debug, Clone)]
pub(crate) enum BatchEvent {
    Updated(Batch),
    Deleted(String),
}

pub(crate) type MachineRx = watch::Receiver<Arc<MachineState>>;
pub(crate) type BatchEventRx = broadcast::Receiver<BatchEvent>;

/// The batch lifecycle controller.
pub(crate) struct LineController {
    pool: DbPool,
    device: DeviceLink,
    config_rx: ConfigRx,
    /// Serializes machine state read-modify-write cycles.
    gate: Mutex<()>,
    machine_tx: watch::Sender<Arc<MachineState>>,
    events_tx: broadcast::Sender<BatchEvent>,
}

impl LineController {
    /// Create the controller and materialize the machine state if this is a fresh database.
    ///
    /// # Errors
    ///
    /// Returns an error if the machine state cannot be loaded.
    pub(crate) async fn new(pool: DbPool, config_rx: ConfigRx) -> Result<Self, ControlError> {
        let initial = db::load_machine_state(&pool, Utc::now()).await?;
        let (machine_tx, _) = watch::channel(Arc::new(initial));
        let (events_tx, _) = broadcast::channel(32);
        let controller = Self {
            device: DeviceLink::new(config_rx.clone()),
            pool,
            config_rx,
            gate: Mutex::new(()),
            machine_tx,
            events_tx,
        };
        // Repair whatever a previous run left behind before serving anything.
        controller.machine_state().await?;
        Ok(controller)
    }

    /// Subscribe to machine state snapshots published after every change.
    pub(crate) fn subscribe_machine(&self) -> MachineRx {
        self.machine_tx.subscribe()
    }

    pub(crate) fn subscribe_batches(&self) -> BatchEventRx {
        self.events_tx.subscribe()
    }

    fn publish_machine(&self, state: &MachineState) {
        self.machine_tx.send_replace(Arc::new(state.clone()));
    }

    fn publish_batch(&self, event: BatchEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("No batch event subscribers");
        }
    }

    /// Clear an active batch pointer that refers to a missing or terminal batch.
    /// Returns whether anything was repaired.
    ///
    /// Must be called with the gate held.
    async fn reconcile(
        conn: &mut SqliteConnection,
        state: &mut MachineState,
    ) -> Result<bool, ControlError> {
        let Some(active_id) = state.active_batch_id.clone() else {
            return Ok(false);
        };
        let active = db::get_batch(&mut *conn, &active_id).await?;
        if active.as_ref().is_some_and(Batch::is_in_flight) {
            return Ok(false);
        }

        info!(
            %active_id,
            status = ?active.map(|b| b.status),
            "Clearing stale active batch pointer"
        );
        let now = Utc::now();
        state.active_batch_id = None;
        state.updated_at = now;
        db::save_machine_state(&mut *conn, state).await?;
        db::set_device_signal(&mut *conn, false, now).await?;
        Ok(true)
    }

    /// Load (creating if needed) and reconcile. Must be called with the gate held.
    async fn load_reconciled(&self) -> Result<MachineState, ControlError> {
        let mut tx = self.pool.begin().await?;
        let mut state = db::load_machine_state(&mut *tx, Utc::now()).await?;
        let repaired = Self::reconcile(&mut tx, &mut state).await?;
        tx.commit().await?;
        if repaired {
            self.publish_machine(&state);
        }
        Ok(state)
    }

    async fn require_batch(&self, id: &str) -> Result<Batch, ControlError> {
        db::get_batch(&self.pool, id)
            .await?
            .ok_or_else(|| ControlError::NotFound(id.to_owned()))
    }

    /// The repaired machine state.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn machine_state(&self) -> Result<MachineState, ControlError> {
        let _gate = self.gate.lock().await;
        self.load_reconciled().await
    }

    /// Start a new batch if the machine is free and supplied.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn create_batch(&self, draft: NewBatch) -> Result<Batch, ControlError> {
        draft.validate().map_err(ControlError::Validation)?;

        let _gate = self.gate.lock().await;
        let mut state = self.load_reconciled().await?;
        if state.active_batch_id.is_some() {
            return Err(Conflict::BatchInProgress.into());
        }
        if state.supplies_low() {
            return Err(Conflict::SuppliesLow.into());
        }

        let now = Utc::now();
        let batch = Batch::new(draft, now);
        let mut tx = self.pool.begin().await?;
        db::insert_batch(&mut *tx, &batch).await?;

        // The device resolves the active batch as soon as it sees the run signal,
        // so the pointer is written first.
        state.active_batch_id = Some(batch.id.clone());
        state.updated_at = now;
        db::save_machine_state(&mut *tx, &state).await?;
        db::set_device_signal(&mut *tx, true, now).await?;
        tx.commit().await?;
        info!(batch_id = %batch.id, output_count = batch.output_count, "Batch started");

        self.device.dispatch_start(&batch.id);
        self.publish_machine(&state);
        self.publish_batch(BatchEvent::Updated(batch.clone()));
        Ok(batch)
    }

    /// Count completed pots, finishing the batch when the target is reached.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn record_progress(
        &self,
        batch_id: &str,
        pots_increment: Option<i64>,
    ) -> Result<Batch, ControlError> {
        let increment = match pots_increment {
            None | Some(0) => {
                return Err(ControlError::Validation(
                    "No pot increment provided".to_owned(),
                ));
            }
            Some(n) if n < 0 => {
                return Err(ControlError::Validation(format!(
                    "Pot increment must be positive, got {n}"
                )));
            }
            Some(n) => n,
        };

        let _gate = self.gate.lock().await;
        let mut state = self.load_reconciled().await?;
        let mut batch = self.require_batch(batch_id).await?;
        if batch.status.is_terminal() {
            return Err(Conflict::AlreadyComplete.into());
        }

        let now = Utc::now();
        let finished = batch.add_pots(increment);
        let next = if finished {
            BatchStatus::Finished
        } else if state.supplies_low() {
            BatchStatus::Paused
        } else {
            BatchStatus::Ongoing
        };
        batch.transition(next, now)?;

        let mut tx = self.pool.begin().await?;
        if finished {
            if state.is_active(&batch.id) {
                state.active_batch_id = None;
                db::set_device_signal(&mut *tx, false, now).await?;
            } else {
                warn!(
                    active = ?state.active_batch_id,
                    "Finished batch was not the active one, leaving the machine alone"
                );
            }
            info!(batch_id = %batch.id, pots = batch.pots_done_count, "Batch finished");
        }
        state.updated_at = now;

        // Machine state first: nobody may see a finished batch that is still marked active.
        db::save_machine_state(&mut *tx, &state).await?;
        db::save_batch(&mut *tx, &batch).await?;
        tx.commit().await?;

        self.publish_machine(&state);
        self.publish_batch(BatchEvent::Updated(batch.clone()));
        Ok(batch)
    }

    /// Abort an in-flight batch and stop the device.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn cancel_batch(&self, batch_id: &str) -> Result<Batch, ControlError> {
        let _gate = self.gate.lock().await;
        let mut state = self.load_reconciled().await?;
        let mut batch = self.require_batch(batch_id).await?;
        if !batch.is_in_flight() {
            return Err(Conflict::NotCancellable(batch.status).into());
        }

        let now = Utc::now();
        let owns_machine = state
            .active_batch_id
            .as_deref()
            .is_none_or(|active| active == batch.id);
        batch.transition(BatchStatus::Cancelled, now)?;

        let mut tx = self.pool.begin().await?;
        if owns_machine {
            db::set_device_signal(&mut *tx, false, now).await?;
        } else {
            warn!(
                active = ?state.active_batch_id,
                "Cancelling a batch that doesn't own the machine, device keeps running"
            );
        }
        db::save_batch(&mut *tx, &batch).await?;

        if state.is_active(&batch.id) {
            state.active_batch_id = None;
        }
        state.updated_at = now;
        db::save_machine_state(&mut *tx, &state).await?;
        tx.commit().await?;
        info!(batch_id = %batch.id, "Batch cancelled");

        if owns_machine {
            self.device.dispatch_stop();
        }
        self.publish_machine(&state);
        self.publish_batch(BatchEvent::Updated(batch.clone()));
        Ok(batch)
    }

    /// Apply resource readings and pause or resume the active batch accordingly.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn update_resource_levels(
        &self,
        update: ResourceUpdate,
    ) -> Result<MachineState, ControlError> {
        let _gate = self.gate.lock().await;
        let mut state = self.load_reconciled().await?;

        let now = Utc::now();
        if let Some(level) = update.soil_level {
            state.soil_level = level;
        }
        if let Some(level) = update.cup_level {
            state.cup_level = level;
        }
        state.updated_at = now;

        let active = match state.active_batch_id {
            Some(ref active_id) => db::get_batch(&self.pool, active_id).await?,
            None => None,
        };
        let mut gated = None;
        if let Some(mut batch) = active {
            let next = match (state.supplies_low(), batch.status) {
                (true, BatchStatus::Ongoing) => Some(BatchStatus::Paused),
                (false, BatchStatus::Paused) => Some(BatchStatus::Ongoing),
                _ => None,
            };
            if let Some(next) = next {
                batch.transition(next, now)?;
                gated = Some(batch);
            }
        }

        let mut tx = self.pool.begin().await?;
        db::save_machine_state(&mut *tx, &state).await?;
        if let Some(ref batch) = gated {
            db::save_batch(&mut *tx, batch).await?;
        }
        tx.commit().await?;

        self.publish_machine(&state);
        if let Some(batch) = gated {
            info!(batch_id = %batch.id, status = %batch.status, "Resource gate changed batch status");
            self.publish_batch(BatchEvent::Updated(batch));
        }
        Ok(state)
    }

    /// Remove a batch that does not own the machine.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn delete_batch(&self, batch_id: &str) -> Result<(), ControlError> {
        let _gate = self.gate.lock().await;
        let state = self.load_reconciled().await?;
        if state.is_active(batch_id) {
            return Err(Conflict::ActiveBatch.into());
        }
        if !db::delete_batch(&self.pool, batch_id).await? {
            return Err(ControlError::NotFound(batch_id.to_owned()));
        }
        info!(%batch_id, "Batch deleted");
        self.publish_batch(BatchEvent::Deleted(batch_id.to_owned()));
        Ok(())
    }

    pub(crate) async fn list_batches(&self) -> Result<Vec<Batch>, ControlError> {
        Ok(db::list_batches(&self.pool).await?)
    }

    pub(crate) async fn batch(&self, batch_id: &str) -> Result<Batch, ControlError> {
        self.require_batch(batch_id).await
    }

    /// The persisted run signal the device polls.
    pub(crate) async fn device_signal(&self) -> Result<DeviceSignal, ControlError> {
        Ok(db::get_device_signal(&self.pool).await?)
    }

    /// Store a heartbeat from the device, stamped with the receive time.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn record_heartbeat(
        &self,
        report: HeartbeatReport,
    ) -> Result<(), ControlError> {
        let record = HeartbeatRecord {
            last_heartbeat: Utc::now(),
            wifi_ssid: report.wifi_ssid,
            wifi_rssi: report.wifi_rssi,
            ip_address: report.ip_address,
        };
        db::upsert_heartbeat(&self.pool, &record).await?;
        Ok(())
    }

    pub(crate) async fn liveness(&self) -> Result<LivenessReport, ControlError> {
        let heartbeat = db::get_heartbeat(&self.pool).await?;
        let threshold = self.config_rx.borrow().device.online_threshold();
        Ok(liveness::assess(heartbeat.as_ref(), Utc::now(), threshold))
    }
}
