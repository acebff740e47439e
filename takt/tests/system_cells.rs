mod util;

use takt::model::product::ProcessPlan;
use takt::model::{ProcessData, ResourceData};
use takt::{Activity, Result, Simulation, seconds};
use util::*;

/// A cell presenting two internal stations as one resource.
fn cell_system(seed: u64) -> takt::ProductionSystem {
    takt::ProductionSystem {
        time_model_data: vec![
            constant("drill_time", 0.5),
            constant("polish_time", 0.3),
            exponential("arrivals", 2.0),
            distance("move", 50.0, 0.0),
        ],
        process_data: vec![
            production("drill", "drill_time"),
            production("polish", "polish_time"),
            ProcessData::Compound {
                id: "drill_and_polish".into(),
                description: String::new(),
                process_ids: vec!["drill".into(), "polish".into()],
            },
            transport("tp", "move"),
        ],
        resource_data: vec![
            // Declared first so cell-level routing prefers the cell.
            ResourceData::SystemResource {
                id: "cell".into(),
                description: String::new(),
                location: [1.0, 0.0],
                capacity: 1,
                process_ids: vec!["drill_and_polish".into()],
                state_ids: vec![],
                control_policy: takt::model::ControlPolicy::Fifo,
                port_ids: vec![],
                dependency_ids: vec![],
                subresource_ids: vec!["station_a".into(), "station_b".into()],
                internal_routing: vec![],
            },
            machine("station_a", [1.0, 0.2], &["drill"]),
            machine("station_b", [1.0, 0.4], &["polish"]),
            transporter("agv", [0.0, 0.0], "tp"),
        ],
        product_data: vec![product("casing", &["drill_and_polish"], "tp")],
        source_data: vec![source("input", [0.0, 0.0], "casing", "arrivals")],
        sink_data: vec![sink("output", [2.0, 0.0], "casing")],
        seed,
        ..Default::default()
    }
}

#[test]
fn cells_decompose_over_their_stations() -> Result<()> {
    let mut sim = Simulation::new(&cell_system(0))?;
    sim.run_until(seconds(300.0))?;

    let summary = sim.summary();
    assert!(summary.finished > 50, "cell produced {}", summary.finished);

    // The cell logs the external contract, the stations the internal work.
    let log = sim.event_log();
    assert!(log.iter().any(|r| r.resource == "cell" && r.state == "drill_and_polish"));
    assert!(log.iter().any(|r| r.resource == "station_a" && r.state == "drill"));
    assert!(log.iter().any(|r| r.resource == "station_b" && r.state == "polish"));
    Ok(())
}

#[test]
fn internal_steps_run_in_routing_order() -> Result<()> {
    let mut sim = Simulation::new(&cell_system(1))?;
    sim.run_until(seconds(100.0))?;

    let log = sim.event_log();
    let first_drill = log
        .iter()
        .find(|r| r.state == "drill" && r.activity == Activity::StartState)
        .map(|r| r.time)
        .expect("no drill ran");
    let first_polish = log
        .iter()
        .find(|r| r.state == "polish" && r.activity == Activity::StartState)
        .map(|r| r.time)
        .expect("no polish ran");
    assert!(
        first_drill <= first_polish,
        "polish ({first_polish}) ran before drill ({first_drill})"
    );
    Ok(())
}

#[test]
fn process_graphs_respect_predecessors() -> Result<()> {
    // b and c both depend on a; d needs both. Declaration order puts b
    // before c; the product must still run a first and d last.
    let mut system = cell_system(2);
    system.time_model_data.push(constant("step_time", 0.2));
    for id in ["a", "b", "c", "d"] {
        system.process_data.push(production(id, "step_time"));
    }
    system.resource_data.push(machine(
        "graph_machine",
        [1.5, 0.0],
        &["a", "b", "c", "d"],
    ));
    system.product_data.push(takt::model::ProductData {
        id: "assembly".into(),
        description: String::new(),
        processes: ProcessPlan::Graph(vec![
            ("a".into(), vec!["b".into(), "c".into()]),
            ("b".into(), vec!["d".into()]),
            ("c".into(), vec!["d".into()]),
            ("d".into(), vec![]),
        ]),
        transport_process: "tp".into(),
        routing_heuristic: takt::model::RoutingHeuristic::Fifo,
        dependency_ids: vec![],
        becomes_primitive: None,
    });
    system
        .source_data
        .push(source("graph_input", [0.0, 1.0], "assembly", "arrivals"));
    system
        .sink_data
        .push(sink("graph_output", [2.0, 1.0], "assembly"));

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(120.0))?;

    let order: Vec<&str> = sim
        .event_log()
        .iter()
        .filter(|r| {
            r.activity == Activity::StartState
                && r.product.as_deref() == Some("assembly_0")
                && ["a", "b", "c", "d"].contains(&r.state.as_str())
        })
        .map(|r| r.state.as_str())
        .collect();
    assert_eq!(order.first(), Some(&"a"), "plan order was {order:?}");
    assert_eq!(order.last(), Some(&"d"), "plan order was {order:?}");
    assert_eq!(order.len(), 4, "plan order was {order:?}");
    Ok(())
}
