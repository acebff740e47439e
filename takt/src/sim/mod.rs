//! The discrete-event core.
//!
//! One logical thread of control: every entity (source loop, controller,
//! router step, dependency acquisition) is a continuation scheduled onto the
//! single event queue in [`clock`]. Entities refer to each other through
//! dense indices into the arena-owned [`engine::World`]; there are no
//! reference cycles and no locks.

pub mod clock;
pub mod controller;
pub mod dependency;
pub mod engine;
pub mod flow;
pub mod log;
pub mod matcher;
pub mod path;
pub mod queue;
pub mod request;
pub mod rng;
pub mod router;
pub mod state;
pub mod time_model;

use derive_more::{Display, Error};
use hifitime::Duration;

macro_rules! index_type {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
            pub(crate) struct $name(pub usize);
        )*
    };
}

index_type! {
    /// Index into the built time model table.
    TmIx,
    /// Index into the built process table.
    ProcIx,
    /// Index into the built state table.
    StateIx,
    /// Index into the built port (queue/store) table.
    PortIx,
    /// Index into the built resource table.
    ResIx,
    /// Index into the built source table.
    SrcIx,
    /// Index into the built sink table.
    SinkIx,
    /// Index into the built node table.
    NodeIx,
    /// Index into the built product type table.
    ProdTypeIx,
    /// Index into the built primitive type table.
    PrimTypeIx,
    /// Index into the built dependency table.
    DepIx,
}

/// Arena key of a live product instance.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct ProductId(pub usize);

/// Arena key of a live primitive instance.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct PrimitiveId(pub usize);

/// Arena key of a request.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct RequestId(pub usize);

/// Arena key of an active execution on a resource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct ExecId(pub usize);

/// Anything with a position that can appear in routes and the link graph.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub(crate) enum Locatable {
    Port(PortIx),
    Resource(ResIx),
    Source(SrcIx),
    Sink(SinkIx),
    Node(NodeIx),
}

/// A product or primitive token held by a queue or resource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum Token {
    Product(ProductId),
    Primitive(PrimitiveId),
}

/// Collected findings of the pre-run validation pass.
#[derive(Debug, Error)]
pub struct ValidationFailure(#[error(not(source))] pub Vec<crate::model::ValidationError>);

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "model validation failed with {} finding(s):", self.0.len())?;
        for error in &self.0 {
            writeln!(f, "  - {error}")?;
        }
        Ok(())
    }
}

/// The engine fault taxonomy. Per-product faults (`NoCompatibleResource`,
/// `NoRouteFound`) are logged against the product and the run continues;
/// the remaining variants are terminal.
#[derive(Debug, Display, Error)]
pub enum SimulationError {
    #[display("{_0}")]
    Validation(ValidationFailure),
    #[display("no resource offers process {process:?} required by product {product:?}")]
    NoCompatibleResource { product: String, process: String },
    #[display("no transport route from {origin:?} to {target:?}")]
    NoRouteFound { origin: String, target: String },
    #[display("event queue ran dry at t={time}s with {live} product(s) in flight")]
    DeadlockDetected { time: f64, live: usize },
    #[display("primitive type {primitive:?} has no live instances and no producer")]
    DependencyUnsatisfiable { primitive: String },
    #[display("request for product {product:?} was cancelled")]
    RequestCancelled { product: String },
}

/// One simulated time unit is one second.
pub fn seconds(value: f64) -> Duration {
    Duration::from_seconds(value)
}
