mod util;

use takt::{Result, Simulation, StateType, seconds};
use takt::model::StateData;
use util::*;

fn line_with_breakdown(seed: u64) -> takt::ProductionSystem {
    let mut system = minimal_line(1.0, 0.8, seed);
    system
        .time_model_data
        .push(exponential("failures", 540.0));
    system.time_model_data.push(constant("repairs", 60.0));
    system.state_data.push(StateData::BreakDown {
        id: "machine_breakdown".into(),
        description: String::new(),
        time_model_id: "failures".into(),
        repair_time_model_id: "repairs".into(),
    });
    system.resource_data[0] = machine_with_states(
        "machine",
        [1.0, 0.0],
        &["p1"],
        &["machine_breakdown"],
    );
    system
}

#[test]
fn state_times_partition_the_horizon() -> Result<()> {
    let mut sim = Simulation::new(&line_with_breakdown(0))?;
    sim.run_until(seconds(10_000.0))?;

    let summary = sim.summary();
    let machine = summary.resource("machine").unwrap();
    assert!(machine.breakdown_time > 0.0, "breakdowns never fired");
    let total = machine.productive_time
        + machine.breakdown_time
        + machine.setup_time
        + machine.standby_time;
    assert!(
        (total - summary.horizon).abs() < 1e-6,
        "state times {total} do not partition horizon {}",
        summary.horizon
    );
    Ok(())
}

#[test]
fn interrupted_service_resumes_without_losing_time() -> Result<()> {
    let mut sim = Simulation::new(&line_with_breakdown(11))?;
    sim.run_until(seconds(10_000.0))?;

    // Interrupt records must pair up per product.
    let starts = sim
        .event_log()
        .iter()
        .filter(|r| r.activity == takt::Activity::StartInterruptState)
        .count();
    let ends = sim
        .event_log()
        .iter()
        .filter(|r| r.activity == takt::Activity::EndInterruptState)
        .count();
    assert!(ends <= starts);
    assert!(starts.abs_diff(ends) <= 2, "unbalanced interrupt records");

    // And the line still produces at a healthy rate.
    assert!(sim.summary().finished > 5000);
    Ok(())
}

#[test]
fn breakdown_records_carry_the_state_type() -> Result<()> {
    let mut sim = Simulation::new(&line_with_breakdown(2))?;
    sim.run_until(seconds(5000.0))?;
    assert!(
        sim.event_log()
            .iter()
            .any(|r| r.state_type == Some(StateType::Breakdown)),
        "no breakdown state records logged"
    );
    Ok(())
}
