mod util;

use takt::model::ResourceData;
use takt::model::primitive::PrimitiveData;
use takt::{Activity, Result, Simulation, seconds};
use util::*;

/// A machine that needs a pallet from a store for every run.
fn line_with_pallets(initial: &[(&str, u32)], seed: u64) -> takt::ProductionSystem {
    let mut system = minimal_line(1.5, 0.8, seed);
    for (store_id, _) in initial {
        system.port_data.push(store(store_id, [0.5, 0.5], 0));
    }
    system.primitive_data.push(PrimitiveData {
        id: "pallet".into(),
        description: String::new(),
        transport_process: "tp".into(),
        storages: initial.iter().map(|(s, _)| (*s).into()).collect(),
        quantity_in_storages: initial.iter().map(|(_, q)| *q).collect(),
        becomes_consumable: false,
    });
    system
        .dependency_data
        .push(primitive_dependency("needs_pallet", "pallet"));
    let ResourceData::Resource { dependency_ids, .. } = &mut system.resource_data[0] else {
        unreachable!()
    };
    dependency_ids.push("needs_pallet".into());
    // A second transporter keeps pallet traffic from starving products.
    system
        .resource_data
        .push(transporter("agv2", [0.5, 0.0], "tp"));
    system
}

#[test]
fn pallets_cycle_between_store_and_machine() -> Result<()> {
    let mut sim = Simulation::new(&line_with_pallets(&[("pallet_store", 5)], 0))?;
    sim.run_until(seconds(1000.0))?;

    let summary = sim.summary();
    assert!(
        summary.finished > 300,
        "pallet loop starved the line: {} finished",
        summary.finished
    );

    // Acquisition and release records pair up per run.
    let acquisitions = sim
        .event_log()
        .iter()
        .filter(|r| r.dependency.as_deref() == Some("needs_pallet"))
        .filter(|r| r.activity == Activity::StartState)
        .count();
    let releases = sim
        .event_log()
        .iter()
        .filter(|r| r.dependency.as_deref() == Some("needs_pallet"))
        .filter(|r| r.activity == Activity::EndState)
        .count();
    assert!(acquisitions > 0, "no pallet was ever acquired");
    assert!(acquisitions.abs_diff(releases) <= 1);
    Ok(())
}

#[test]
fn stock_in_two_stores_is_drawn_from_both() -> Result<()> {
    let mut sim = Simulation::new(&line_with_pallets(
        &[("store_a", 5), ("store_b", 20)],
        3,
    ))?;
    sim.run_until(seconds(500.0))?;
    assert!(sim.summary().finished > 100);
    Ok(())
}

#[test]
fn zero_stock_is_an_unsatisfiable_dependency() -> Result<()> {
    let mut sim = Simulation::new(&line_with_pallets(&[("empty_store", 0)], 1))?;
    let error = sim.run_until(seconds(100.0)).unwrap_err();
    assert!(
        error.to_string().contains("pallet"),
        "unexpected error: {error}"
    );
    Ok(())
}
