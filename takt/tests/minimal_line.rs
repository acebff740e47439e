mod util;

use takt::{Activity, Result, Simulation, seconds};
use util::*;

#[test]
fn products_flow_from_source_to_sink() -> Result<()> {
    let system = minimal_line(1.0, 0.8, 0);
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(1000.0))?;

    let summary = sim.summary();
    assert!(
        summary.finished > 800,
        "expected a near-saturated line, finished {}",
        summary.finished
    );
    assert!(summary.created >= summary.finished);

    let machine = summary.resource("machine").unwrap();
    assert!(
        machine.utilization > 0.6 && machine.utilization < 0.95,
        "machine utilization {}",
        machine.utilization
    );
    Ok(())
}

#[test]
fn every_product_has_ordered_events() -> Result<()> {
    let system = minimal_line(1.0, 0.8, 7);
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(200.0))?;

    let mut last_seen: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    for record in sim.event_log() {
        if let Some(product) = &record.product {
            let last = last_seen.entry(product.clone()).or_insert(record.time);
            assert!(
                record.time >= *last,
                "events for {product} went backwards at t={}",
                record.time
            );
            *last = record.time;
        }
    }
    Ok(())
}

#[test]
fn finished_products_complete_their_plan() -> Result<()> {
    let system = minimal_line(2.0, 0.5, 3);
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(100.0))?;

    let finishes: Vec<&str> = sim
        .event_log()
        .iter()
        .filter(|r| r.activity == Activity::FinishProduct)
        .filter_map(|r| r.product.as_deref())
        .collect();
    assert!(!finishes.is_empty());
    for product in finishes {
        // One production start and one end per finished product.
        let starts = sim
            .event_log()
            .iter()
            .filter(|r| {
                r.activity == Activity::StartState
                    && r.state == "p1"
                    && r.product.as_deref() == Some(product)
            })
            .count();
        assert_eq!(starts, 1, "{product} ran its single step {starts} times");
    }
    Ok(())
}

#[test]
fn run_can_resume_with_a_later_deadline() -> Result<()> {
    let system = minimal_line(1.0, 0.8, 5);
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(50.0))?;
    let halfway = sim.summary().finished;
    sim.run_until(seconds(100.0))?;
    assert!(sim.summary().finished > halfway);
    assert_eq!(sim.now(), seconds(100.0));
    Ok(())
}
