mod util;

use takt::model::StateData;
use takt::{Result, Simulation, StateType, seconds};
use util::*;

#[test]
fn shift_calendar_alternates_availability() -> Result<()> {
    // 8 time units on, 16 off: two thirds of the horizon are off-shift.
    let mut system = minimal_line(1.0, 0.5, 0);
    system.time_model_data.push(constant("on_shift", 8.0));
    system.time_model_data.push(constant("off_shift", 16.0));
    system.state_data.push(StateData::NonScheduled {
        id: "shift".into(),
        description: String::new(),
        time_model_id: "on_shift".into(),
        non_scheduled_time_model_id: "off_shift".into(),
    });
    system.resource_data[0] = machine_with_states("machine", [1.0, 0.0], &["p1"], &["shift"]);

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(960.0))?;

    let summary = sim.summary();
    let machine = summary.resource("machine").unwrap();
    // 40 full 24-unit cycles, 16 off each.
    assert!(
        (machine.non_scheduled_time - 640.0).abs() < 1.0,
        "off-shift time {}",
        machine.non_scheduled_time
    );
    assert!(summary.finished > 0);
    // Work still gets done, but only in the on-windows.
    assert!(machine.utilization < 0.45);
    Ok(())
}

#[test]
fn transports_park_to_charge() -> Result<()> {
    let mut system = minimal_line(1.0, 0.2, 0);
    system.time_model_data.push(constant("charge_time", 5.0));
    system.state_data.push(StateData::Charging {
        id: "battery".into(),
        description: String::new(),
        time_model_id: "charge_time".into(),
        battery_capacity: 10.0,
        threshold: 0.2,
    });
    system.resource_data[1] = takt::model::ResourceData::Resource {
        id: "agv".into(),
        description: String::new(),
        location: [0.0, 0.0],
        capacity: 1,
        process_ids: vec!["tp".into()],
        state_ids: vec!["battery".into()],
        control_policy: takt::model::ControlPolicy::Fifo,
        port_ids: vec![],
        dependency_ids: vec![],
    };
    // Slow the shuttle down so movement actually drains the battery.
    system.time_model_data[2] = distance("move", 2.0, 0.0);

    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(500.0))?;

    let summary = sim.summary();
    let agv = summary.resource("agv").unwrap();
    assert!(
        agv.charging_time > 0.0,
        "battery never drained below the threshold"
    );
    assert!(
        sim.event_log()
            .iter()
            .any(|r| r.state_type == Some(StateType::Charging)),
        "no charging records logged"
    );
    assert!(summary.finished > 0, "charging stalls must not stop the line");
    Ok(())
}
