mod util;

use takt::model::ProcessData;
use takt::{Result, Simulation, seconds};
use util::*;

/// Two machines on a directed ring; transport is capability-matched and
/// constrained to the ring's links.
fn ring_system(seed: u64) -> takt::ProductionSystem {
    let mut system = takt::ProductionSystem {
        time_model_data: vec![
            constant("work_a", 0.6),
            constant("work_b", 0.9),
            exponential("arrivals", 2.0),
            distance("ring_speed", 10.0, 0.05),
        ],
        process_data: vec![
            production("p_a", "work_a"),
            production("p_b", "work_b"),
            ProcessData::RequiredCapability {
                id: "needs_ring".into(),
                description: String::new(),
                capability: "ring".into(),
            },
            ProcessData::LinkTransport {
                id: "ring_route".into(),
                description: String::new(),
                time_model_id: "ring_speed".into(),
                links: vec![
                    ["input".into(), "m_a".into()],
                    ["m_a".into(), "m_b".into()],
                    ["m_b".into(), "output".into()],
                    ["output".into(), "input".into()],
                ],
                capability: "ring".into(),
                loading_time_model_id: None,
                unloading_time_model_id: None,
            },
        ],
        resource_data: vec![
            machine("m_a", [1.0, 0.0], &["p_a"]),
            machine("m_b", [2.0, 0.0], &["p_b"]),
            transporter("shuttle_1", [0.0, 0.0], "ring_route"),
            transporter("shuttle_2", [0.0, 1.0], "ring_route"),
        ],
        product_data: vec![
            product("widget", &["p_a", "p_b"], "needs_ring"),
            product("gadget", &["p_b"], "needs_ring"),
        ],
        source_data: vec![
            source("input", [0.0, 0.0], "widget", "arrivals"),
            source("input2", [0.0, 0.5], "gadget", "arrivals"),
        ],
        sink_data: vec![
            sink("output", [3.0, 0.0], "widget"),
            sink("output2", [3.0, 0.5], "gadget"),
        ],
        seed,
        ..Default::default()
    };
    // The second flow shares the ring through the same capability.
    if let ProcessData::LinkTransport { links, .. } = &mut system.process_data[3] {
        links.push(["input2".into(), "m_a".into()]);
        links.push(["input2".into(), "m_b".into()]);
        links.push(["m_b".into(), "output2".into()]);
        links.push(["output2".into(), "input".into()]);
        links.push(["output".into(), "input2".into()]);
    }
    system
}

#[test]
fn capability_matched_transport_moves_both_types() -> Result<()> {
    let mut sim = Simulation::new(&ring_system(0))?;
    sim.run_until(seconds(480.0))?;

    let summary = sim.summary();
    let widgets = summary.product_type("widget").unwrap();
    let gadgets = summary.product_type("gadget").unwrap();
    assert!(widgets.finished >= 1, "no widget finished");
    assert!(gadgets.finished >= 1, "no gadget finished");

    for id in ["m_a", "m_b"] {
        let resource = summary.resource(id).unwrap();
        assert!(
            resource.utilization > 0.01 && resource.utilization < 0.99,
            "{id} utilization {} out of range",
            resource.utilization
        );
    }
    Ok(())
}

#[test]
fn disconnected_targets_fail_the_product_not_the_run() -> Result<()> {
    let mut system = ring_system(1);
    // Cut the edge into m_b; widgets can still do p_a but their second
    // step is unreachable.
    if let ProcessData::LinkTransport { links, .. } = &mut system.process_data[3] {
        links.retain(|[from, to]| !(from == "m_a" && to == "m_b"));
        links.retain(|[from, to]| !(from == "input2" && to == "m_b"));
    }
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(200.0))?;

    let summary = sim.summary();
    assert_eq!(
        summary.product_type("widget").map(|w| w.finished),
        Some(0),
        "widgets cannot reach m_b over the cut ring"
    );
    assert!(summary.failed > 0, "stranded widgets should be finalized as failed");
    Ok(())
}

#[test]
fn plain_transport_ignores_links() -> Result<()> {
    // The same layout with a free transporter instead of the ring.
    let mut system = ring_system(2);
    system.product_data = vec![
        product("widget", &["p_a", "p_b"], "free_move"),
        product("gadget", &["p_b"], "free_move"),
    ];
    system.process_data.push(transport("free_move", "ring_speed"));
    system.resource_data[2] = transporter("shuttle_1", [0.0, 0.0], "free_move");
    system.resource_data[3] = transporter("shuttle_2", [0.0, 1.0], "free_move");
    let mut sim = Simulation::new(&system)?;
    sim.run_until(seconds(480.0))?;
    assert!(sim.summary().finished > 0);
    Ok(())
}
