mod util;

use takt::model::{ProcessData, ResourceData, StateData};
use takt::{Activity, Result, Simulation, StateType, seconds};
use util::*;

/// One machine offering two processes with declared changeovers, fed by
/// two alternating product types.
fn changeover_system(seed: u64) -> takt::ProductionSystem {
    takt::ProductionSystem {
        time_model_data: vec![
            constant("work_1", 0.4),
            constant("work_2", 0.4),
            constant("arrivals", 1.0),
            constant("changeover", 0.25),
            distance("move", 50.0, 0.0),
        ],
        process_data: vec![
            production("p1", "work_1"),
            production("p2", "work_2"),
            transport("tp", "move"),
        ],
        state_data: vec![
            StateData::Setup {
                id: "s_1_to_2".into(),
                description: String::new(),
                time_model_id: "changeover".into(),
                origin_setup: "p1".into(),
                target_setup: "p2".into(),
            },
            StateData::Setup {
                id: "s_2_to_1".into(),
                description: String::new(),
                time_model_id: "changeover".into(),
                origin_setup: "p2".into(),
                target_setup: "p1".into(),
            },
        ],
        resource_data: vec![
            machine_with_states("mill", [1.0, 0.0], &["p1", "p2"], &["s_1_to_2", "s_2_to_1"]),
            transporter("agv", [0.0, 0.0], "tp"),
        ],
        product_data: vec![
            product("alpha", &["p1"], "tp"),
            product("beta", &["p2"], "tp"),
        ],
        source_data: vec![
            source("in_alpha", [0.0, 0.0], "alpha", "arrivals"),
            source("in_beta", [0.0, 0.5], "beta", "arrivals"),
        ],
        sink_data: vec![
            sink("out_alpha", [2.0, 0.0], "alpha"),
            sink("out_beta", [2.0, 0.5], "beta"),
        ],
        seed,
        ..Default::default()
    }
}

#[test]
fn changeovers_are_logged_between_process_switches() -> Result<()> {
    let mut sim = Simulation::new(&changeover_system(0))?;
    sim.run_until(seconds(200.0))?;

    let setups = sim
        .event_log()
        .iter()
        .filter(|r| r.state_type == Some(StateType::Setup))
        .filter(|r| r.activity == Activity::StartState)
        .count();
    assert!(setups > 0, "alternating products never triggered a setup");

    let summary = sim.summary();
    let mill = summary.resource("mill").unwrap();
    assert!(mill.setup_time > 0.0);
    assert!(summary.finished > 100);
    Ok(())
}

#[test]
fn same_process_needs_no_setup() -> Result<()> {
    let mut system = changeover_system(1);
    // Only alpha flows; the mill never leaves p1.
    system.source_data.truncate(1);
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(100.0))?;

    assert!(
        !sim.event_log()
            .iter()
            .any(|r| r.state_type == Some(StateType::Setup)),
        "setup records for an unchanged process"
    );
    Ok(())
}

#[test]
fn loading_steps_run_before_the_service() -> Result<()> {
    let mut system = minimal_line(1.5, 0.5, 0);
    system.time_model_data.push(constant("clamp_time", 0.2));
    system.process_data.push(ProcessData::Loading {
        id: "clamp".into(),
        description: String::new(),
        time_model_id: "clamp_time".into(),
    });
    system
        .dependency_data
        .push(loading_dependency("clamp_first", "clamp"));
    let ResourceData::Resource { dependency_ids, .. } = &mut system.resource_data[0] else {
        unreachable!()
    };
    dependency_ids.push("clamp_first".into());

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(300.0))?;

    let clamp_runs = sim
        .event_log()
        .iter()
        .filter(|r| r.activity == Activity::StartState && r.state == "clamp")
        .count();
    let service_runs = sim
        .event_log()
        .iter()
        .filter(|r| r.activity == Activity::StartState && r.state == "p1")
        .count();
    assert!(clamp_runs > 0);
    assert_eq!(clamp_runs, service_runs, "one clamp per service run");

    // The clamp always starts before its service at equal-or-earlier time.
    let first_clamp = sim
        .event_log()
        .iter()
        .find(|r| r.state == "clamp")
        .unwrap()
        .time;
    let first_service = sim
        .event_log()
        .iter()
        .find(|r| r.state == "p1" && r.activity == Activity::StartState)
        .unwrap()
        .time;
    assert!(first_clamp <= first_service);
    Ok(())
}
