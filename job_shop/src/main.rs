//! A small two-stage job shop: turning and grinding with a shared AGV,
//! breakdowns on the second stage, and a pallet pool feeding stage one.
//! Prints the aggregate KPIs after a 2880-unit run (two simulated days,
//! one unit per minute).

use takt::model::product::ProcessPlan;
use takt::model::time_model::{DistanceMetric, DistributionFunction};
use takt::model::*;
use takt::{Result, Simulation, seconds};

fn system() -> ProductionSystem {
    let function = |id: &str, dist, location: f64, scale: f64| TimeModelData::Function {
        id: id.into(),
        description: String::new(),
        distribution_function: dist,
        location,
        scale,
        batch_size: 100,
    };
    ProductionSystem {
        time_model_data: vec![
            function("turning_time", DistributionFunction::Normal, 4.0, 0.4),
            function("grinding_time", DistributionFunction::Normal, 3.0, 0.3),
            function("arrivals", DistributionFunction::Exponential, 5.0, 0.0),
            function("mtbf", DistributionFunction::Exponential, 540.0, 0.0),
            function("mttr", DistributionFunction::Exponential, 45.0, 0.0),
            TimeModelData::Distance {
                id: "agv_speed".into(),
                description: String::new(),
                speed: 60.0,
                reaction_time: 0.1,
                metric: DistanceMetric::Manhattan,
            },
        ],
        process_data: vec![
            ProcessData::Production {
                id: "turning".into(),
                description: String::new(),
                time_model_id: "turning_time".into(),
                failure_rate: 0.0,
            },
            ProcessData::Production {
                id: "grinding".into(),
                description: String::new(),
                time_model_id: "grinding_time".into(),
                failure_rate: 0.0,
            },
            ProcessData::Transport {
                id: "agv_move".into(),
                description: String::new(),
                time_model_id: "agv_speed".into(),
                loading_time_model_id: None,
                unloading_time_model_id: None,
            },
        ],
        state_data: vec![StateData::BreakDown {
            id: "grinder_failures".into(),
            description: String::new(),
            time_model_id: "mtbf".into(),
            repair_time_model_id: "mttr".into(),
        }],
        port_data: vec![PortData::Store {
            id: "pallet_store".into(),
            description: String::new(),
            capacity: 0,
            location: [5.0, 5.0],
            port_locations: None,
            interface_type: PortInterface::InputOutput,
        }],
        primitive_data: vec![PrimitiveData {
            id: "pallet".into(),
            description: String::new(),
            transport_process: "agv_move".into(),
            storages: vec!["pallet_store".into()],
            quantity_in_storages: vec![8],
            becomes_consumable: false,
        }],
        dependency_data: vec![DependencyData::Primitive {
            id: "turning_needs_pallet".into(),
            description: String::new(),
            required_primitive: "pallet".into(),
        }],
        resource_data: vec![
            ResourceData::Resource {
                id: "lathe".into(),
                description: String::new(),
                location: [10.0, 0.0],
                capacity: 1,
                process_ids: vec!["turning".into()],
                state_ids: vec![],
                control_policy: ControlPolicy::Fifo,
                port_ids: vec![],
                dependency_ids: vec!["turning_needs_pallet".into()],
            },
            ResourceData::Resource {
                id: "grinder".into(),
                description: String::new(),
                location: [20.0, 0.0],
                capacity: 1,
                process_ids: vec!["grinding".into()],
                state_ids: vec!["grinder_failures".into()],
                control_policy: ControlPolicy::Spt,
                port_ids: vec![],
                dependency_ids: vec![],
            },
            ResourceData::Resource {
                id: "agv_1".into(),
                description: String::new(),
                location: [0.0, 0.0],
                capacity: 1,
                process_ids: vec!["agv_move".into()],
                state_ids: vec![],
                control_policy: ControlPolicy::SptTransport,
                port_ids: vec![],
                dependency_ids: vec![],
            },
            ResourceData::Resource {
                id: "agv_2".into(),
                description: String::new(),
                location: [0.0, 5.0],
                capacity: 1,
                process_ids: vec!["agv_move".into()],
                state_ids: vec![],
                control_policy: ControlPolicy::SptTransport,
                port_ids: vec![],
                dependency_ids: vec![],
            },
        ],
        product_data: vec![ProductData {
            id: "shaft".into(),
            description: String::new(),
            processes: ProcessPlan::Sequence(vec!["turning".into(), "grinding".into()]),
            transport_process: "agv_move".into(),
            routing_heuristic: RoutingHeuristic::ShortestQueue,
            dependency_ids: vec![],
            becomes_primitive: None,
        }],
        source_data: vec![SourceData {
            id: "goods_in".into(),
            description: String::new(),
            location: [0.0, 0.0],
            product_type: "shaft".into(),
            time_model_id: Some("arrivals".into()),
            routing_heuristic: RoutingHeuristic::ShortestQueue,
            output_queue_ids: vec![],
            order_ids: vec![],
        }],
        sink_data: vec![SinkData {
            id: "goods_out".into(),
            description: String::new(),
            location: [30.0, 0.0],
            product_type: "shaft".into(),
            input_queue_ids: vec![],
        }],
        seed: 42,
        ..Default::default()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut sim = Simulation::new(&system())?;
    sim.run_until(seconds(2880.0))?;
    let summary = sim.summary();

    println!("horizon            {:>10.1}", summary.horizon);
    println!("created / finished {:>6} / {}", summary.created, summary.finished);
    println!("mean WIP           {:>10.2}", summary.mean_wip);
    println!("mean cycle time    {:>10.2}", summary.mean_cycle_time);
    println!("OEE                {:>10.3}", summary.oee);
    println!();
    println!(
        "{:<10} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "resource", "util", "prod", "setup", "down", "standby"
    );
    for resource in &summary.per_resource {
        println!(
            "{:<10} {:>8.3} {:>8.1} {:>8.1} {:>8.1} {:>8.1}",
            resource.resource,
            resource.utilization,
            resource.productive_time,
            resource.setup_time,
            resource.breakdown_time,
            resource.standby_time,
        );
    }
    Ok(())
}
