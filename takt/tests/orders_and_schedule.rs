mod util;

use takt::model::{OrderData, OrderedProductData, ScheduleEntryData, SourceData};
use takt::{Activity, Result, Simulation, seconds};
use util::*;

#[test]
fn order_source_releases_quantities_at_release_times() -> Result<()> {
    let mut system = minimal_line(1.0, 0.3, 0);
    system.order_data = vec![
        OrderData {
            id: "order_late".into(),
            description: String::new(),
            ordered_products: vec![OrderedProductData {
                product_type: "part".into(),
                quantity: 1,
            }],
            order_time: 5.0,
            release_time: Some(15.0),
            priority: 1,
        },
        OrderData {
            id: "order_early".into(),
            description: String::new(),
            ordered_products: vec![OrderedProductData {
                product_type: "part".into(),
                quantity: 2,
            }],
            order_time: 0.0,
            release_time: Some(10.0),
            priority: 1,
        },
    ];
    system.source_data = vec![SourceData {
        id: "input".into(),
        description: String::new(),
        location: [0.0, 0.0],
        product_type: "part".into(),
        time_model_id: None,
        routing_heuristic: takt::model::RoutingHeuristic::Fifo,
        output_queue_ids: vec![],
        order_ids: vec!["order_late".into(), "order_early".into()],
    }];

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(100.0))?;

    let creations: Vec<f64> = sim
        .event_log()
        .iter()
        .filter(|r| r.activity == Activity::CreateProduct)
        .map(|r| r.time)
        .collect();
    assert_eq!(creations, vec![10.0, 10.0, 15.0]);
    assert_eq!(sim.summary().finished, 3);
    Ok(())
}

#[test]
fn colliding_release_times_honor_priority() -> Result<()> {
    let mut system = minimal_line(1.0, 0.3, 0);
    system.product_data.push(product("rush", &["p1"], "tp"));
    system.sink_data.push(sink("rush_out", [2.0, 0.5], "rush"));
    system.order_data = vec![
        OrderData {
            id: "normal".into(),
            description: String::new(),
            ordered_products: vec![OrderedProductData {
                product_type: "part".into(),
                quantity: 1,
            }],
            order_time: 0.0,
            release_time: Some(10.0),
            priority: 1,
        },
        OrderData {
            id: "rush_order".into(),
            description: String::new(),
            ordered_products: vec![OrderedProductData {
                product_type: "rush".into(),
                quantity: 1,
            }],
            order_time: 0.0,
            release_time: Some(10.0),
            priority: 5,
        },
    ];
    system.source_data = vec![SourceData {
        id: "input".into(),
        description: String::new(),
        location: [0.0, 0.0],
        product_type: "part".into(),
        time_model_id: None,
        routing_heuristic: takt::model::RoutingHeuristic::Fifo,
        output_queue_ids: vec![],
        order_ids: vec!["normal".into(), "rush_order".into()],
    }];

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(50.0))?;

    let first_creation = sim
        .event_log()
        .iter()
        .find(|r| r.activity == Activity::CreateProduct)
        .and_then(|r| r.product.clone())
        .unwrap();
    assert!(
        first_creation.starts_with("rush"),
        "higher priority order released second: {first_creation}"
    );
    Ok(())
}

#[test]
fn schedule_entries_pin_start_states() -> Result<()> {
    let mut system = minimal_line(1.0, 0.5, 0);
    // No free arrivals; only the pinned event drives the run.
    system.source_data.clear();
    system.schedule = vec![ScheduleEntryData {
        time: 5.0,
        resource: "machine".into(),
        process: "p1".into(),
        product: "part".into(),
        expected_end_time: Some(5.5),
    }];

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(50.0))?;

    let pinned = sim
        .event_log()
        .iter()
        .find(|r| {
            r.activity == Activity::StartState
                && r.resource == "machine"
                && r.state == "p1"
        })
        .expect("scheduled start state missing");
    assert_eq!(pinned.time, 5.0);
    assert_eq!(pinned.product.as_deref(), Some("part_0"));
    assert_eq!(sim.summary().finished, 1);
    Ok(())
}
