//! The append-only event log.
//!
//! Every state transition, every product creation and finish, and every
//! dependency acquisition/release produces exactly one record. Writes are
//! synchronous with simulated time; the vector order is the event-order
//! total order. KPI post-processing consumes this log and nothing else.

use derive_more::Deref;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    #[serde(rename = "create product")]
    CreateProduct,
    #[serde(rename = "finish product")]
    FinishProduct,
    #[serde(rename = "start state")]
    StartState,
    #[serde(rename = "end state")]
    EndState,
    #[serde(rename = "start interrupt state")]
    StartInterruptState,
    #[serde(rename = "end interrupt state")]
    EndInterruptState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateType {
    Production,
    Transport,
    Setup,
    Breakdown,
    ProcessBreakdown,
    Charging,
    NonScheduled,
}

/// One row of the log. Inapplicable columns stay empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "Time")]
    pub time: f64,
    #[serde(rename = "Resource")]
    pub resource: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "State Type")]
    pub state_type: Option<StateType>,
    #[serde(rename = "Activity")]
    pub activity: Activity,
    #[serde(rename = "Product")]
    pub product: Option<String>,
    #[serde(rename = "Expected End Time")]
    pub expected_end_time: Option<f64>,
    #[serde(rename = "Origin location")]
    pub origin_location: Option<String>,
    #[serde(rename = "Target location")]
    pub target_location: Option<String>,
    #[serde(rename = "Empty Transport")]
    pub empty_transport: Option<bool>,
    #[serde(rename = "Requesting Item")]
    pub requesting_item: Option<String>,
    #[serde(rename = "Dependency")]
    pub dependency: Option<String>,
    #[serde(rename = "process")]
    pub process: Option<String>,
}

impl EventRecord {
    pub fn new(
        time: f64,
        resource: impl Into<String>,
        state: impl Into<String>,
        state_type: Option<StateType>,
        activity: Activity,
    ) -> Self {
        Self {
            time,
            resource: resource.into(),
            state: state.into(),
            state_type,
            activity,
            product: None,
            expected_end_time: None,
            origin_location: None,
            target_location: None,
            empty_transport: None,
            requesting_item: None,
            dependency: None,
            process: None,
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_expected_end(mut self, time: f64) -> Self {
        self.expected_end_time = Some(time);
        self
    }

    pub fn with_route(
        mut self,
        origin: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.origin_location = Some(origin.into());
        self.target_location = Some(target.into());
        self
    }

    pub fn with_empty_transport(mut self, empty: bool) -> Self {
        self.empty_transport = Some(empty);
        self
    }

    pub fn with_requesting_item(mut self, item: impl Into<String>) -> Self {
        self.requesting_item = Some(item.into());
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }

    pub fn with_process(mut self, process: impl Into<String>) -> Self {
        self.process = Some(process.into());
        self
    }
}

#[derive(Debug, Default, Deref, Serialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub(crate) fn push(&mut self, record: EventRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }
}
