// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Activity records and the store that holds them.
//!
//! An activity is a toggle density (transitions per second) plus a duty
//! factor (fraction of time the signal is high). The store keeps three maps:
//! propagated activity per pin, activity of hidden sequential outputs
//! (`IQ`/`IQN`) per instance, and the user-pinned overlay that propagation
//! never overwrites.

use crate::error::{Error, Result};
use crate::netlist::{InstId, PinId};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an activity value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityOrigin {
    Global,
    Input,
    User,
    Vcd,
    Propagated,
    Clock,
    Constant,
    Defaulted,
    Unknown,
}

impl ActivityOrigin {
    pub const ALL: [ActivityOrigin; 9] = [
        ActivityOrigin::Global,
        ActivityOrigin::Input,
        ActivityOrigin::User,
        ActivityOrigin::Vcd,
        ActivityOrigin::Propagated,
        ActivityOrigin::Clock,
        ActivityOrigin::Constant,
        ActivityOrigin::Defaulted,
        ActivityOrigin::Unknown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActivityOrigin::Global => "global",
            ActivityOrigin::Input => "input",
            ActivityOrigin::User => "user",
            ActivityOrigin::Vcd => "vcd",
            ActivityOrigin::Propagated => "propagated",
            ActivityOrigin::Clock => "clock",
            ActivityOrigin::Constant => "constant",
            ActivityOrigin::Defaulted => "defaulted",
            ActivityOrigin::Unknown => "unknown",
        }
    }

    /// Pinned origins are never replaced by propagated values.
    pub fn is_pinned(self) -> bool {
        matches!(
            self,
            ActivityOrigin::Global | ActivityOrigin::User | ActivityOrigin::Vcd
        )
    }
}

impl fmt::Display for ActivityOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Toggle density, duty factor and origin of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    density: f64,
    duty: f64,
    origin: ActivityOrigin,
}

impl ActivityRecord {
    /// Densities below this are treated as zero.
    pub const MIN_DENSITY: f64 = 1e-10;

    pub fn new(density: f64, duty: f64, origin: ActivityOrigin) -> Self {
        let mut record = ActivityRecord {
            density: 0.0,
            duty: 0.0,
            origin,
        };
        record.set_density(density);
        record.set_duty(duty);
        record
    }

    /// The "nothing known" value every lookup falls back to.
    pub const fn unknown() -> Self {
        ActivityRecord {
            density: 0.0,
            duty: 0.0,
            origin: ActivityOrigin::Unknown,
        }
    }

    /// Build a record from user input, rejecting values that cannot describe
    /// a signal instead of silently clipping them.
    pub fn checked(density: f64, duty: f64, origin: ActivityOrigin) -> Result<Self> {
        let reason = if !density.is_finite() || !duty.is_finite() {
            Some("values must be finite")
        } else if density < 0.0 {
            Some("density must not be negative")
        } else if !(0.0..=1.0).contains(&duty) {
            Some("duty must lie in [0, 1]")
        } else {
            None
        };
        match reason {
            Some(reason) => {
                clilog::error!(
                    "rejected activity density={} duty={}: {}",
                    density,
                    duty,
                    reason
                );
                Err(Error::InvalidActivity {
                    density,
                    duty,
                    reason,
                })
            }
            None => Ok(ActivityRecord::new(density, duty, origin)),
        }
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn duty(&self) -> f64 {
        self.duty
    }

    pub fn origin(&self) -> ActivityOrigin {
        self.origin
    }

    pub fn set_density(&mut self, density: f64) {
        // also catches NaN
        self.density = if density >= Self::MIN_DENSITY {
            density
        } else {
            0.0
        };
    }

    pub fn set_duty(&mut self, duty: f64) {
        self.duty = if duty.is_nan() {
            0.0
        } else {
            duty.clamp(0.0, 1.0)
        };
    }

    pub fn set_origin(&mut self, origin: ActivityOrigin) {
        self.origin = origin;
    }

    pub fn with_origin(mut self, origin: ActivityOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn is_set(&self) -> bool {
        self.origin != ActivityOrigin::Unknown
    }
}

impl Default for ActivityRecord {
    fn default() -> Self {
        ActivityRecord::unknown()
    }
}

impl fmt::Display for ActivityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "density {:.4e}/s duty {:.3} ({})",
            self.density, self.duty, self.origin
        )
    }
}

/// Hidden output of a register or latch: the instance plus the internal
/// liberty port name (`IQ`, `IQN`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequentialOutputKey {
    pub instance: InstId,
    pub port: CompactString,
}

impl SequentialOutputKey {
    pub fn new(instance: InstId, port: &str) -> Self {
        SequentialOutputKey {
            instance,
            port: CompactString::from(port),
        }
    }
}

/// Activity tables owned by the power engine.
///
/// Propagated values live in a dense vector indexed by pin id; the user
/// overlay and the sequential map are keyed maps. No lookup fails: absent
/// entries read as [`ActivityRecord::unknown`].
#[derive(Debug, Clone, Default)]
pub struct ActivityStore {
    activities: Vec<ActivityRecord>,
    seq_activities: IndexMap<SequentialOutputKey, ActivityRecord>,
    user_activities: IndexMap<PinId, ActivityRecord>,
}

impl ActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pin: PinId) -> ActivityRecord {
        self.activities.get(pin).copied().unwrap_or_default()
    }

    pub fn has(&self, pin: PinId) -> bool {
        self.get(pin).is_set()
    }

    pub fn set(&mut self, pin: PinId, activity: ActivityRecord) {
        if pin >= self.activities.len() {
            self.activities.resize(pin + 1, ActivityRecord::unknown());
        }
        self.activities[pin] = activity;
    }

    pub fn get_seq(&self, key: &SequentialOutputKey) -> Option<ActivityRecord> {
        self.seq_activities.get(key).copied()
    }

    pub fn has_seq(&self, key: &SequentialOutputKey) -> bool {
        self.seq_activities.contains_key(key)
    }

    pub fn set_seq(&mut self, key: SequentialOutputKey, activity: ActivityRecord) {
        self.seq_activities.insert(key, activity);
    }

    pub fn user(&self, pin: PinId) -> Option<&ActivityRecord> {
        self.user_activities.get(&pin)
    }

    pub fn has_user(&self, pin: PinId) -> bool {
        self.user_activities.contains_key(&pin)
    }

    pub fn set_user(&mut self, pin: PinId, activity: ActivityRecord) {
        self.user_activities.insert(pin, activity);
    }

    pub fn unset_user(&mut self, pin: PinId) -> Option<ActivityRecord> {
        self.user_activities.shift_remove(&pin)
    }

    pub fn user_activities(&self) -> impl Iterator<Item = (PinId, &ActivityRecord)> + '_ {
        self.user_activities.iter().map(|(&pin, a)| (pin, a))
    }

    /// Drop propagated and sequential values, keeping the user overlay.
    pub fn clear(&mut self) {
        self.activities.clear();
        self.seq_activities.clear();
    }

    /// Forget everything recorded for a pin that is being deleted.
    pub fn remove_pin(&mut self, pin: PinId) {
        if let Some(a) = self.activities.get_mut(pin) {
            *a = ActivityRecord::unknown();
        }
        self.user_activities.shift_remove(&pin);
    }

    pub fn remove_instance(&mut self, inst: InstId) {
        self.seq_activities.retain(|key, _| key.instance != inst);
    }

    /// Number of pins holding a propagated value.
    pub fn propagated_count(&self) -> usize {
        self.activities.iter().filter(|a| a.is_set()).count()
    }
}
