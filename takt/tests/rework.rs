mod util;

use takt::model::ProcessData;
use takt::{Activity, Result, Simulation, seconds};
use util::*;

fn line_with_rework(blocking: bool, failure_rate: f64, seed: u64) -> takt::ProductionSystem {
    let mut system = minimal_line(1.0, 0.8, seed);
    system.process_data[0] = failing_production("p1", "service", failure_rate);
    system.time_model_data.push(constant("rework_time", 0.4));
    system.process_data.push(ProcessData::Rework {
        id: "fix_p1".into(),
        description: String::new(),
        time_model_id: "rework_time".into(),
        reworked_process_ids: vec!["p1".into()],
        blocking,
    });
    system
        .resource_data
        .push(machine("rework_station", [1.5, 0.5], &["fix_p1"]));
    system
}

#[test]
fn failed_fraction_tracks_the_failure_rate() -> Result<()> {
    let mut sim = Simulation::new(&line_with_rework(false, 0.05, 0))?;
    sim.run_until(seconds(2000.0))?;

    let reworked: std::collections::HashSet<&str> = sim
        .event_log()
        .iter()
        .filter(|r| r.activity == Activity::StartState && r.state == "fix_p1")
        .filter_map(|r| r.product.as_deref())
        .collect();
    let finished = sim.summary().finished as f64;
    assert!(finished > 500.0);
    let fraction = reworked.len() as f64 / finished;
    assert!(
        (0.02..=0.09).contains(&fraction),
        "rework fraction {fraction} out of range"
    );
    Ok(())
}

#[test]
fn blocking_rework_reruns_the_failed_step() -> Result<()> {
    // Every run fails, so each product needs at least one rework plus a
    // re-run of the step before it can finish.
    let mut sim = Simulation::new(&line_with_rework(true, 1.0, 1))?;
    sim.run_until(seconds(60.0))?;

    let log = sim.event_log();
    let finished: Vec<&str> = log
        .iter()
        .filter(|r| r.activity == Activity::FinishProduct)
        .filter_map(|r| r.product.as_deref())
        .collect();
    // With a 100 % failure rate nothing ever passes p1.
    assert!(
        finished.is_empty(),
        "products finished despite blocking failures: {finished:?}"
    );
    let rework_runs = log
        .iter()
        .filter(|r| r.activity == Activity::StartState && r.state == "fix_p1")
        .count();
    assert!(rework_runs > 0, "no rework was ever dispatched");
    Ok(())
}

#[test]
fn nonblocking_rework_does_not_block_completion() -> Result<()> {
    let mut sim = Simulation::new(&line_with_rework(false, 1.0, 2))?;
    sim.run_until(seconds(200.0))?;
    // Non-blocking: the step counts as done, the rework runs once, and the
    // product still reaches the sink.
    assert!(sim.summary().finished > 0);
    Ok(())
}
