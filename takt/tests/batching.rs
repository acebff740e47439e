mod util;

use takt::model::{DependencyData, ResourceData};
use takt::{Activity, Result, Simulation, seconds};
use util::*;

/// An oven that only fires with at least two parts loaded.
fn oven_system(seed: u64) -> takt::ProductionSystem {
    let mut system = minimal_line(1.0, 2.0, seed);
    system.time_model_data[1] = constant("arrivals", 1.0);
    system.dependency_data.push(DependencyData::Lot {
        id: "oven_lot".into(),
        description: String::new(),
        min_lot_size: 2,
        max_lot_size: 3,
    });
    system.resource_data[0] = ResourceData::Resource {
        id: "machine".into(),
        description: String::new(),
        location: [1.0, 0.0],
        capacity: 3,
        process_ids: vec!["p1".into()],
        state_ids: vec![],
        control_policy: takt::model::ControlPolicy::Fifo,
        port_ids: vec![],
        dependency_ids: vec!["oven_lot".into()],
    };
    system
}

#[test]
fn lots_start_and_finish_together() -> Result<()> {
    let mut sim = Simulation::new(&oven_system(0))?;
    sim.run_until(seconds(400.0))?;

    let summary = sim.summary();
    assert!(summary.finished > 100, "batching starved the oven");

    // Batch members share their start timestamp.
    let mut starts_by_time: std::collections::BTreeMap<u64, usize> = Default::default();
    for record in sim.event_log() {
        if record.activity == Activity::StartState && record.state == "p1" {
            *starts_by_time.entry(record.time.to_bits()).or_default() += 1;
        }
    }
    assert!(
        starts_by_time.values().any(|count| *count >= 2),
        "no batch of at least two ever started"
    );
    // A lone request never fires below the minimum lot size.
    let singles = starts_by_time.values().filter(|c| **c == 1).count();
    assert_eq!(singles, 0, "{singles} sub-minimum batches started");
    Ok(())
}

#[test]
fn a_single_waiting_part_keeps_waiting() -> Result<()> {
    // One arrival inside the horizon: the lot can never fill, nothing
    // starts. (A second arrival far beyond the deadline keeps the engine's
    // deadlock detector out of the picture.)
    let mut system = oven_system(1);
    system.time_model_data[1] = takt::model::TimeModelData::Scheduled {
        id: "arrivals".into(),
        description: String::new(),
        schedule: vec![1.0, 500.0],
        absolute: false,
        cyclic: false,
    };
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(100.0))?;

    assert_eq!(sim.summary().finished, 0);
    assert_eq!(sim.live_products(), 1, "the lone part stays in the system");
    Ok(())
}
