//! State declarations: the interruptions and transitions a resource can
//! undergo besides plain production.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StateData {
    /// Unscheduled downtime. `time_model_id` samples the inter-arrival of
    /// failures, `repair_time_model_id` the repair duration.
    BreakDown {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        repair_time_model_id: String,
    },
    /// Like [`StateData::BreakDown`] but scoped to one process; other
    /// processes on the resource keep running.
    ProcessBreakDown {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        repair_time_model_id: String,
        process_id: String,
    },
    /// A changeover from `origin_setup` to `target_setup`. A transition
    /// whose origin equals its target takes zero time and is not logged.
    Setup {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        origin_setup: String,
        target_setup: String,
    },
    /// Shift calendar: alternates available windows (`time_model_id`) and
    /// unavailable windows (`non_scheduled_time_model_id`). Accounted
    /// separately from breakdowns.
    NonScheduled {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        non_scheduled_time_model_id: String,
    },
    /// Battery charging for transport resources. The battery budget is
    /// `battery_capacity` time units of movement; once the remaining budget
    /// falls below `threshold * battery_capacity` the resource charges for
    /// a duration sampled from `time_model_id` and the budget resets.
    Charging {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        battery_capacity: f64,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
}

fn default_threshold() -> f64 {
    0.2
}

impl StateData {
    pub fn id(&self) -> &str {
        match self {
            StateData::BreakDown { id, .. }
            | StateData::ProcessBreakDown { id, .. }
            | StateData::Setup { id, .. }
            | StateData::NonScheduled { id, .. }
            | StateData::Charging { id, .. } => id,
        }
    }

    pub fn time_model_id(&self) -> &str {
        match self {
            StateData::BreakDown { time_model_id, .. }
            | StateData::ProcessBreakDown { time_model_id, .. }
            | StateData::Setup { time_model_id, .. }
            | StateData::NonScheduled { time_model_id, .. }
            | StateData::Charging { time_model_id, .. } => time_model_id,
        }
    }
}
