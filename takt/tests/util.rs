#![allow(dead_code)]

use takt::model::dependency::LoadingPhase;
use takt::model::product::ProcessPlan;
use takt::model::time_model::{DistanceMetric, DistributionFunction};
use takt::model::*;

pub fn constant(id: &str, value: f64) -> TimeModelData {
    TimeModelData::Function {
        id: id.into(),
        description: String::new(),
        distribution_function: DistributionFunction::Constant,
        location: value,
        scale: 0.0,
        batch_size: 100,
    }
}

pub fn exponential(id: &str, mean: f64) -> TimeModelData {
    TimeModelData::Function {
        id: id.into(),
        description: String::new(),
        distribution_function: DistributionFunction::Exponential,
        location: mean,
        scale: 0.0,
        batch_size: 100,
    }
}

pub fn normal(id: &str, location: f64, scale: f64) -> TimeModelData {
    TimeModelData::Function {
        id: id.into(),
        description: String::new(),
        distribution_function: DistributionFunction::Normal,
        location,
        scale,
        batch_size: 100,
    }
}

pub fn distance(id: &str, speed: f64, reaction_time: f64) -> TimeModelData {
    TimeModelData::Distance {
        id: id.into(),
        description: String::new(),
        speed,
        reaction_time,
        metric: DistanceMetric::Manhattan,
    }
}

pub fn production(id: &str, time_model: &str) -> ProcessData {
    ProcessData::Production {
        id: id.into(),
        description: String::new(),
        time_model_id: time_model.into(),
        failure_rate: 0.0,
    }
}

pub fn failing_production(id: &str, time_model: &str, failure_rate: f64) -> ProcessData {
    ProcessData::Production {
        id: id.into(),
        description: String::new(),
        time_model_id: time_model.into(),
        failure_rate,
    }
}

pub fn transport(id: &str, time_model: &str) -> ProcessData {
    ProcessData::Transport {
        id: id.into(),
        description: String::new(),
        time_model_id: time_model.into(),
        loading_time_model_id: None,
        unloading_time_model_id: None,
    }
}

pub fn machine(id: &str, location: Location, processes: &[&str]) -> ResourceData {
    machine_with_states(id, location, processes, &[])
}

pub fn machine_with_states(
    id: &str,
    location: Location,
    processes: &[&str],
    states: &[&str],
) -> ResourceData {
    ResourceData::Resource {
        id: id.into(),
        description: String::new(),
        location,
        capacity: 1,
        process_ids: processes.iter().map(|p| (*p).into()).collect(),
        state_ids: states.iter().map(|s| (*s).into()).collect(),
        control_policy: ControlPolicy::Fifo,
        port_ids: vec![],
        dependency_ids: vec![],
    }
}

pub fn transporter(id: &str, location: Location, process: &str) -> ResourceData {
    ResourceData::Resource {
        id: id.into(),
        description: String::new(),
        location,
        capacity: 1,
        process_ids: vec![process.into()],
        state_ids: vec![],
        control_policy: ControlPolicy::Fifo,
        port_ids: vec![],
        dependency_ids: vec![],
    }
}

pub fn product(id: &str, steps: &[&str], transport_process: &str) -> ProductData {
    ProductData {
        id: id.into(),
        description: String::new(),
        processes: ProcessPlan::Sequence(steps.iter().map(|s| (*s).into()).collect()),
        transport_process: transport_process.into(),
        routing_heuristic: RoutingHeuristic::Fifo,
        dependency_ids: vec![],
        becomes_primitive: None,
    }
}

pub fn source(id: &str, location: Location, product_type: &str, time_model: &str) -> SourceData {
    SourceData {
        id: id.into(),
        description: String::new(),
        location,
        product_type: product_type.into(),
        time_model_id: Some(time_model.into()),
        routing_heuristic: RoutingHeuristic::Fifo,
        output_queue_ids: vec![],
        order_ids: vec![],
    }
}

pub fn sink(id: &str, location: Location, product_type: &str) -> SinkData {
    SinkData {
        id: id.into(),
        description: String::new(),
        location,
        product_type: product_type.into(),
        input_queue_ids: vec![],
    }
}

pub fn store(id: &str, location: Location, capacity: u32) -> PortData {
    PortData::Store {
        id: id.into(),
        description: String::new(),
        capacity,
        location,
        port_locations: None,
        interface_type: PortInterface::InputOutput,
    }
}

pub fn primitive_dependency(id: &str, primitive: &str) -> DependencyData {
    DependencyData::Primitive {
        id: id.into(),
        description: String::new(),
        required_primitive: primitive.into(),
    }
}

pub fn loading_dependency(id: &str, process: &str) -> DependencyData {
    DependencyData::Loading {
        id: id.into(),
        description: String::new(),
        loading_process: process.into(),
        phase: LoadingPhase::Before,
        can_be_chained: false,
    }
}

/// One machine, one fast transporter, one product with one step. The
/// smallest system that exercises the full source-to-sink loop.
pub fn minimal_line(arrival_mean: f64, service: f64, seed: u64) -> ProductionSystem {
    ProductionSystem {
        time_model_data: vec![
            constant("service", service),
            exponential("arrivals", arrival_mean),
            distance("move", 50.0, 0.0),
        ],
        process_data: vec![production("p1", "service"), transport("tp", "move")],
        resource_data: vec![
            machine("machine", [1.0, 0.0], &["p1"]),
            transporter("agv", [0.0, 0.0], "tp"),
        ],
        product_data: vec![product("part", &["p1"], "tp")],
        source_data: vec![source("input", [0.0, 0.0], "part", "arrivals")],
        sink_data: vec![sink("output", [2.0, 0.0], "part")],
        seed,
        ..Default::default()
    }
}
