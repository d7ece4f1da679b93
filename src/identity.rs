//! Resource identity: process-unique ids plus audit metadata.
//!
//! Every stored resource carries exactly one [`Identity`]. Ids come from a
//! snowflake-style generator:
//!
//! ```text
//! | 39 bits: 10ms ticks since 2024-01-01 | 8 bits: sequence | 16 bits: machine |
//! ```
//!
//! The generator is a single owned service; share it through `Arc`.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SEQUENCE_BITS: u32 = 8;
const MACHINE_BITS: u32 = 16;
const TIME_MASK: u64 = (1 << 39) - 1;
const SEQUENCE_MASK: u16 = (1 << SEQUENCE_BITS) - 1;

/// Length of one generator tick.
const TICK_MILLIS: i64 = 10;
/// 2024-01-01T00:00:00Z
const EPOCH_MILLIS: i64 = 1_704_067_200_000;

/// Audit and versioning envelope attached to every resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub creation_time: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub update_time: Option<DateTime<Utc>>,
}

struct FlakeState {
    tick: i64,
    sequence: u16,
}

/// Allocates ids and stamps audit metadata.
pub struct IdentityAllocator {
    machine_id: u16,
    state: Mutex<FlakeState>,
}

impl IdentityAllocator {
    pub fn new(machine_id: u16) -> Self {
        Self {
            machine_id,
            state: Mutex::new(FlakeState {
                tick: 0,
                sequence: 0,
            }),
        }
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    /// Mint the next id, rendered as lowercase hex.
    ///
    /// When more than 256 ids are requested within one tick the logical
    /// clock runs ahead of the wall clock instead of blocking.
    pub fn next_id(&self) -> String {
        let now = current_tick();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        if now > state.tick {
            state.tick = now;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                state.tick += 1;
            }
        }

        let raw = ((state.tick as u64 & TIME_MASK) << (SEQUENCE_BITS + MACHINE_BITS))
            | ((state.sequence as u64) << MACHINE_BITS)
            | self.machine_id as u64;
        format!("{:x}", raw)
    }

    /// Build the identity for a freshly created resource.
    pub fn new_identity(&self, principal: &str, kind: &str) -> Identity {
        Identity {
            id: self.next_id(),
            kind: kind.to_string(),
            version: 1,
            created_by: principal.to_string(),
            updated_by: None,
            creation_time: Utc::now(),
            update_time: None,
        }
    }

    /// Record an update. `version` stays at its creation value.
    pub fn touch(&self, principal: &str, identity: &mut Identity) {
        identity.updated_by = Some(principal.to_string());
        identity.update_time = Some(Utc::now());
    }
}

fn current_tick() -> i64 {
    (Utc::now().timestamp_millis() - EPOCH_MILLIS) / TICK_MILLIS
}
