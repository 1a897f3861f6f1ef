//! Records owned by the line controller: batches, the machine state singleton,
//! the device run signal and the device heartbeat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Lifecycle status of a batch.
///
/// `Finished` and `Cancelled` are terminal; see [`BatchStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Ongoing,
    Paused,
    Finished,
    Cancelled,
}

serde_plain::derive_display_from_serialize!(BatchStatus);
serde_plain::derive_fromstr_from_deserialize!(BatchStatus);

impl BatchStatus {
    /// Whether no further changes are allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }

    /// Whether a batch in this status owns the machine.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        !self.is_terminal()
    }

    /// The complete transition table. Re-entering the current in-flight status is allowed
    /// and treated as a no-op write.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use BatchStatus as S;
        match (self, next) {
            (S::Ongoing | S::Paused, S::Ongoing | S::Paused | S::Finished | S::Cancelled) => true,
            (S::Finished | S::Cancelled, _) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("Batch cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: BatchStatus,
    pub to: BatchStatus,
}

/// Availability of a consumable. The device only reports "enough" or "empty".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ResourceLevel {
    Depleted,
    Sufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("Resource level must be 0 or 1, got {0}")]
pub struct InvalidResourceLevel(pub i64);

impl TryFrom<i64> for ResourceLevel {
    type Error = InvalidResourceLevel;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Depleted),
            1 => Ok(Self::Sufficient),
            other => Err(InvalidResourceLevel(other)),
        }
    }
}

impl From<ResourceLevel> for i64 {
    fn from(level: ResourceLevel) -> Self {
        match level {
            ResourceLevel::Depleted => 0,
            ResourceLevel::Sufficient => 1,
        }
    }
}

/// One production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub title: String,
    pub seed_type: String,
    pub output_count: i64,
    pub pots_done_count: i64,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub title: String,
    pub seed_type: String,
    pub output_count: i64,
}

impl NewBatch {
    /// Checks the fields a batch can never change after creation.
    ///
    /// # Errors
    ///
    /// Returns a human readable reason for the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Title is required".to_owned());
        }
        if self.seed_type.trim().is_empty() {
            return Err("Seed type is required".to_owned());
        }
        if self.output_count < 1 {
            return Err(format!(
                "Output count must be at least 1, got {}",
                self.output_count
            ));
        }
        Ok(())
    }
}

impl Batch {
    /// A fresh, ongoing batch with nothing produced yet.
    #[must_use]
    pub fn new(draft: NewBatch, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: draft.title.trim().to_owned(),
            seed_type: draft.seed_type.trim().to_owned(),
            output_count: draft.output_count,
            pots_done_count: 0,
            status: BatchStatus::Ongoing,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    /// Move to `next`, refusing anything outside the transition table.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the move is not allowed; the batch is left untouched.
    pub fn transition(
        &mut self,
        next: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Adds completed pots, capped at the target. Returns whether the target is reached.
    pub fn add_pots(&mut self, increment: i64) -> bool {
        self.pots_done_count = self
            .pots_done_count
            .saturating_add(increment)
            .min(self.output_count);
        self.pots_done_count >= self.output_count
    }
}

/// The single coordination record of the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineState {
    pub system_name: String,
    pub soil_level: ResourceLevel,
    pub cup_level: ResourceLevel,
    pub active_batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const DEFAULT_SYSTEM_NAME: &str = "main";

impl MachineState {
    #[must_use]
    pub fn with_defaults(now: DateTime<Utc>) -> Self {
        Self {
            system_name: DEFAULT_SYSTEM_NAME.to_owned(),
            soil_level: ResourceLevel::Sufficient,
            cup_level: ResourceLevel::Sufficient,
            active_batch_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The resource gate: true when either consumable has run out.
    #[must_use]
    pub fn supplies_low(&self) -> bool {
        self.soil_level == ResourceLevel::Depleted || self.cup_level == ResourceLevel::Depleted
    }

    #[must_use]
    pub fn is_active(&self, batch_id: &str) -> bool {
        self.active_batch_id.as_deref() == Some(batch_id)
    }
}

/// Older firmware wrote `""` or the literal string `"null"` instead of clearing the field.
pub(crate) fn normalize_batch_ref(raw: Option<String>) -> Option<String> {
    raw.filter(|id| !id.is_empty() && id != "null")
}

/// Partial update of the resource levels. Absent fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdate {
    #[serde(default)]
    pub soil_level: Option<ResourceLevel>,
    #[serde(default)]
    pub cup_level: Option<ResourceLevel>,
}

/// Whether the device should currently be running. The device polls this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSignal {
    pub is_running: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Last heartbeat received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRecord {
    pub last_heartbeat: DateTime<Utc>,
    pub wifi_ssid: Option<String>,
    pub wifi_rssi: Option<i32>,
    pub ip_address: Option<String>,
}
