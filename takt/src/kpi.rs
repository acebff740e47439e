//! KPI extraction.
//!
//! Everything here is derived from the event log alone: throughput, WIP,
//! cycle times, per-resource state shares, utilization and OEE. The same
//! aggregates the original terminal front-end prints after a run.

use crate::sim::log::{Activity, EventRecord, StateType};
use ahash::AHashMap;
use serde::Serialize;

/// Time shares of one resource over the run horizon.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceKpi {
    pub resource: String,
    pub capacity: u32,
    /// Busy time summed over parallel capacity units.
    pub productive_time: f64,
    pub setup_time: f64,
    pub breakdown_time: f64,
    pub process_breakdown_time: f64,
    pub charging_time: f64,
    pub non_scheduled_time: f64,
    /// `horizon - interrupts - productive/capacity`, clamped at zero.
    pub standby_time: f64,
    /// `productive_time / (capacity * horizon)`.
    pub utilization: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductTypeKpi {
    pub product_type: String,
    pub created: u64,
    pub finished: u64,
    /// Finished instances per time unit.
    pub throughput: f64,
    pub mean_cycle_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub horizon: f64,
    pub created: u64,
    pub finished: u64,
    pub failed: u64,
    /// Time-weighted mean number of live products.
    pub mean_wip: f64,
    pub mean_cycle_time: f64,
    pub per_product_type: Vec<ProductTypeKpi>,
    pub per_resource: Vec<ResourceKpi>,
    /// availability x performance x quality over all production resources.
    pub oee: f64,
}

impl RunSummary {
    pub fn resource(&self, id: &str) -> Option<&ResourceKpi> {
        self.per_resource.iter().find(|r| r.resource == id)
    }

    pub fn product_type(&self, id: &str) -> Option<&ProductTypeKpi> {
        self.per_product_type.iter().find(|p| p.product_type == id)
    }
}

/// The product type encoded in an instance name (`<type>_<n>`).
fn type_of(product: &str) -> &str {
    product.rsplit_once('_').map(|(ty, _)| ty).unwrap_or(product)
}

pub(crate) fn summarize(
    records: &[EventRecord],
    horizon: f64,
    resources: &[(String, u32)],
) -> RunSummary {
    let mut created: AHashMap<String, f64> = AHashMap::new();
    let mut created_per_type: AHashMap<String, u64> = AHashMap::new();
    let mut finished_per_type: AHashMap<String, u64> = AHashMap::new();
    let mut cycle_times_per_type: AHashMap<String, Vec<f64>> = AHashMap::new();
    let mut failed = 0u64;

    // WIP integration over the event order.
    let mut live = 0i64;
    let mut last_time = 0.0;
    let mut wip_area = 0.0;

    // Open state segments: (resource, product-or-state key, state type).
    let mut open: AHashMap<(String, String, StateType), f64> = AHashMap::new();
    let mut state_time: AHashMap<(String, StateType), f64> = AHashMap::new();

    for record in records {
        wip_area += live as f64 * (record.time - last_time);
        last_time = record.time;

        match record.activity {
            Activity::CreateProduct => {
                if let Some(product) = &record.product {
                    created.insert(product.clone(), record.time);
                    *created_per_type.entry(type_of(product).to_owned()).or_default() += 1;
                }
                live += 1;
            }
            Activity::FinishProduct => {
                if let Some(product) = &record.product {
                    if record.state.starts_with("failed") {
                        failed += 1;
                    } else if let Some(start) = created.get(product) {
                        let ty = type_of(product).to_owned();
                        *finished_per_type.entry(ty.clone()).or_default() += 1;
                        cycle_times_per_type
                            .entry(ty)
                            .or_default()
                            .push(record.time - start);
                    }
                }
                live -= 1;
            }
            Activity::StartState => {
                if let Some(state_type) = record.state_type {
                    let key = segment_key(record, state_type);
                    open.insert(key, record.time);
                }
            }
            Activity::EndState => {
                if let Some(state_type) = record.state_type {
                    let key = segment_key(record, state_type);
                    if let Some(start) = open.remove(&key) {
                        *state_time
                            .entry((record.resource.clone(), state_type))
                            .or_default() += record.time - start;
                    }
                }
            }
            Activity::StartInterruptState => {
                // Close the productive segment; the repair resumes it.
                if let Some(state_type) = record.state_type {
                    let key = segment_key(record, state_type);
                    if let Some(start) = open.remove(&key) {
                        *state_time
                            .entry((record.resource.clone(), state_type))
                            .or_default() += record.time - start;
                    }
                }
            }
            Activity::EndInterruptState => {
                if let Some(state_type) = record.state_type {
                    let key = segment_key(record, state_type);
                    open.insert(key, record.time);
                }
            }
        }
    }
    wip_area += live as f64 * (horizon - last_time).max(0.0);

    // Segments still open at the horizon count up to it.
    for ((resource, _, state_type), start) in open {
        *state_time.entry((resource, state_type)).or_default() += (horizon - start).max(0.0);
    }

    let per_resource: Vec<ResourceKpi> = resources
        .iter()
        .map(|(id, capacity)| {
            let share = |ty: StateType| state_time.get(&(id.clone(), ty)).copied().unwrap_or(0.0);
            let productive = share(StateType::Production) + share(StateType::Transport);
            let setup = share(StateType::Setup);
            let breakdown = share(StateType::Breakdown);
            let process_breakdown = share(StateType::ProcessBreakdown);
            let charging = share(StateType::Charging);
            let non_scheduled = share(StateType::NonScheduled);
            let cap = f64::from(*capacity);
            let standby = (horizon
                - breakdown
                - charging
                - non_scheduled
                - setup
                - productive / cap.max(1.0))
            .max(0.0);
            ResourceKpi {
                resource: id.clone(),
                capacity: *capacity,
                productive_time: productive,
                setup_time: setup,
                breakdown_time: breakdown,
                process_breakdown_time: process_breakdown,
                charging_time: charging,
                non_scheduled_time: non_scheduled,
                standby_time: standby,
                utilization: if horizon > 0.0 {
                    productive / (cap * horizon)
                } else {
                    0.0
                },
            }
        })
        .collect();

    let mut per_product_type: Vec<ProductTypeKpi> = Vec::new();
    let mut type_ids: Vec<String> = created_per_type.keys().cloned().collect();
    type_ids.sort();
    for ty in type_ids {
        let finished = finished_per_type.get(&ty).copied().unwrap_or(0);
        let cycles = cycle_times_per_type.get(&ty).map(Vec::as_slice).unwrap_or(&[]);
        per_product_type.push(ProductTypeKpi {
            product_type: ty.clone(),
            created: created_per_type[&ty],
            finished,
            throughput: if horizon > 0.0 {
                finished as f64 / horizon
            } else {
                0.0
            },
            mean_cycle_time: if cycles.is_empty() {
                0.0
            } else {
                cycles.iter().sum::<f64>() / cycles.len() as f64
            },
        });
    }

    let created_total: u64 = created_per_type.values().sum();
    let finished_total: u64 = finished_per_type.values().sum();
    let all_cycles: Vec<f64> = cycle_times_per_type.values().flatten().copied().collect();

    let oee = overall_oee(&per_resource, horizon, finished_total, failed);

    RunSummary {
        horizon,
        created: created_total,
        finished: finished_total,
        failed,
        mean_wip: if horizon > 0.0 { wip_area / horizon } else { 0.0 },
        mean_cycle_time: if all_cycles.is_empty() {
            0.0
        } else {
            all_cycles.iter().sum::<f64>() / all_cycles.len() as f64
        },
        per_product_type,
        per_resource,
        oee,
    }
}

fn segment_key(record: &EventRecord, state_type: StateType) -> (String, String, StateType) {
    // Production segments are per product; resource-wide states (breakdown,
    // shifts) use the state name.
    let discriminator = record
        .product
        .clone()
        .unwrap_or_else(|| record.state.clone());
    (record.resource.clone(), discriminator, state_type)
}

fn overall_oee(resources: &[ResourceKpi], horizon: f64, finished: u64, failed: u64) -> f64 {
    if horizon <= 0.0 || resources.is_empty() {
        return 0.0;
    }
    let n = resources.len() as f64;
    let availability: f64 = resources
        .iter()
        .map(|r| {
            ((horizon - r.breakdown_time - r.charging_time - r.non_scheduled_time) / horizon)
                .clamp(0.0, 1.0)
        })
        .sum::<f64>()
        / n;
    let performance: f64 = resources
        .iter()
        .map(|r| r.utilization.clamp(0.0, 1.0))
        .sum::<f64>()
        / n;
    let quality = if finished + failed == 0 {
        1.0
    } else {
        finished as f64 / (finished + failed) as f64
    };
    availability * performance * quality
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::log::EventRecord;

    fn record(
        time: f64,
        resource: &str,
        state: &str,
        state_type: Option<StateType>,
        activity: Activity,
        product: Option<&str>,
    ) -> EventRecord {
        let mut r = EventRecord::new(time, resource, state, state_type, activity);
        r.product = product.map(str::to_owned);
        r
    }

    #[test]
    fn wip_and_cycle_time_follow_create_and_finish() {
        let log = vec![
            record(0.0, "src", "src", None, Activity::CreateProduct, Some("A_0")),
            record(2.0, "src", "src", None, Activity::CreateProduct, Some("A_1")),
            record(4.0, "sink", "sink", None, Activity::FinishProduct, Some("A_0")),
            record(8.0, "sink", "sink", None, Activity::FinishProduct, Some("A_1")),
        ];
        let summary = summarize(&log, 10.0, &[]);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.finished, 2);
        assert_eq!(summary.mean_cycle_time, 5.0);
        // 1 live in [0,2), 2 in [2,4), 1 in [4,8), 0 after.
        assert!((summary.mean_wip - (2.0 + 4.0 + 4.0) / 10.0).abs() < 1e-9);
    }

    #[test]
    fn interrupts_do_not_double_count_productive_time() {
        let log = vec![
            record(0.0, "m", "p", Some(StateType::Production), Activity::StartState, Some("A_0")),
            record(3.0, "m", "p", Some(StateType::Production), Activity::StartInterruptState, Some("A_0")),
            record(3.0, "m", "bd", Some(StateType::Breakdown), Activity::StartState, None),
            record(5.0, "m", "bd", Some(StateType::Breakdown), Activity::EndState, None),
            record(5.0, "m", "p", Some(StateType::Production), Activity::EndInterruptState, Some("A_0")),
            record(7.0, "m", "p", Some(StateType::Production), Activity::EndState, Some("A_0")),
        ];
        let summary = summarize(&log, 10.0, &[("m".to_owned(), 1)]);
        let m = summary.resource("m").unwrap();
        assert!((m.productive_time - 5.0).abs() < 1e-9);
        assert!((m.breakdown_time - 2.0).abs() < 1e-9);
        assert!(
            (m.productive_time + m.breakdown_time + m.standby_time - 10.0).abs() < 1e-6
        );
    }
}
