mod util;

use takt::{Activity, Result, Simulation, seconds};
use util::*;

#[test]
fn validation_failures_surface_before_any_event() {
    let mut system = minimal_line(1.0, 0.8, 0);
    // Dangling time model reference.
    system.process_data[0] = production("p1", "missing_time_model");
    let error = Simulation::new(&system).unwrap_err();
    let message = error.to_string();
    assert!(
        message.contains("missing_time_model"),
        "unexpected message: {message}"
    );
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut system = minimal_line(1.0, 0.8, 0);
    system.process_data.push(production("p1", "service"));
    assert!(Simulation::new(&system).is_err());
}

#[test]
fn unprovided_process_is_rejected() {
    let mut system = minimal_line(1.0, 0.8, 0);
    system.product_data[0] = product("part", &["p1", "phantom_step"], "tp");
    system.process_data.push(production("phantom_step", "service"));
    // The process exists but nobody offers it.
    let error = Simulation::new(&system).unwrap_err();
    assert!(error.to_string().contains("phantom_step"));
}

#[test]
fn a_missing_transporter_fails_the_product_not_the_run() -> Result<()> {
    let mut system = minimal_line(1.0, 0.8, 0);
    // No transporter offers tp anymore.
    system.resource_data.retain(|r| {
        !matches!(r, takt::model::ResourceData::Resource { id, .. } if id == "agv")
    });

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(50.0))?;

    let summary = sim.summary();
    assert_eq!(summary.finished, 0);
    assert!(summary.failed > 0, "stranded products should be finalized");
    // The run itself stayed healthy to the deadline.
    assert_eq!(sim.now(), seconds(50.0));
    assert!(
        sim.event_log()
            .iter()
            .any(|r| r.activity == Activity::FinishProduct && r.state.starts_with("failed")),
        "no failure record logged"
    );
    Ok(())
}
