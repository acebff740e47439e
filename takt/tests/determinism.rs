mod util;

use takt::{Result, Simulation, seconds};
use util::*;

fn run_log(seed: u64) -> Result<String> {
    let system = minimal_line(1.0, 0.8, seed);
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(300.0))?;
    Ok(format!("{:?}", sim.event_log()))
}

#[test]
fn identical_seeds_replay_identical_logs() -> Result<()> {
    assert_eq!(run_log(42)?, run_log(42)?);
    Ok(())
}

#[test]
fn different_seeds_produce_different_logs() -> Result<()> {
    assert_ne!(run_log(1)?, run_log(2)?);
    Ok(())
}
