mod util;

use takt::{Result, Simulation, seconds};
use util::*;

#[test]
fn live_products_never_exceed_the_cap() -> Result<()> {
    // The source would flood the line without the cap: arrivals every time
    // unit against a 2.5-unit service.
    let mut system = minimal_line(1.0, 2.5, 0);
    system.time_model_data[1] = constant("arrivals", 1.0);
    system.conwip_number = Some(3);

    let mut sim = Simulation::new(&system)?;
    for step in 1..=200 {
        sim.run_until(seconds(step as f64 * 5.0))?;
        assert!(
            sim.live_products() <= 3,
            "ConWIP exceeded at t={}: {} live",
            sim.now().to_seconds(),
            sim.live_products()
        );
    }
    let summary = sim.summary();
    assert!(summary.finished > 0, "capped line still produces");
    assert!(summary.mean_wip <= 3.0 + 1e-9);
    Ok(())
}

#[test]
fn release_resumes_after_products_finish() -> Result<()> {
    let mut system = minimal_line(1.0, 0.5, 1);
    system.time_model_data[1] = constant("arrivals", 1.0);
    system.conwip_number = Some(2);

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(500.0))?;
    let summary = sim.summary();
    // Far more products than the cap flow through over the run.
    assert!(
        summary.finished > 50,
        "only {} finished under ConWIP",
        summary.finished
    );
    Ok(())
}
