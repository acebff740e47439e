//! Request records.
//!
//! A request is the unit of work handed from the router to a controller:
//! "this item needs this process, starting at this origin, ending at this
//! target, using these dependencies". Requests are frozen once enqueued;
//! the mutable [`DepProgress`] tracks acquisition only.

use crate::sim::{DepIx, PortIx, PrimTypeIx, PrimitiveId, ProcIx, ResIx, SinkIx, Token};
use smallvec::SmallVec;

/// Why a transport request exists; drives the completion action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportPurpose {
    /// Deliver a product to the input queue of a planned production step.
    FeedProduction,
    /// Deliver a finished product to a sink.
    ToSink(SinkIx),
    /// Fetch a primitive for the named request's dependency set. The stamp
    /// guards against arena slot reuse.
    PrimitiveFetch {
        consumer: crate::sim::RequestId,
        stamp: u64,
    },
    /// Return a released primitive to a store.
    PrimitiveReturn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Production,
    Transport { purpose: TransportPurpose },
}

/// Dependency acquisition state of one request. Partial acquisitions are
/// rolled back on every early exit except physically-fetched primitives,
/// which stay staged at the resource until the request runs or dies.
#[derive(Debug, Default)]
pub(crate) struct DepProgress {
    /// Primitive types still to be fetched, one entry per instance needed.
    pub primitives_needed: SmallVec<PrimTypeIx, 2>,
    /// Instances staged at the resource for this request.
    pub primitives_held: SmallVec<PrimitiveId, 2>,
    /// Fetch transports still under way.
    pub primitives_inbound: u32,
    /// Co-resources currently locked for this request.
    pub resources_locked: SmallVec<ResIx, 2>,
}

impl DepProgress {
    pub fn primitives_ready(&self) -> bool {
        self.primitives_needed.is_empty() && self.primitives_inbound == 0
    }
}

#[derive(Debug)]
pub(crate) struct Request {
    pub kind: RequestKind,
    /// Resource whose controller serves this request.
    pub resource: ResIx,
    /// The offered process that will run.
    pub process: ProcIx,
    /// The product's required process this request fulfills. Differs from
    /// `process` for capability matches.
    pub required: ProcIx,
    pub origin: PortIx,
    /// Destination queue; the put reservation is held from creation.
    pub target: PortIx,
    pub cargo: Token,
    /// Plan node this request completes, for production requests.
    pub plan_step: Option<usize>,
    /// Insertion stamp; FIFO/LIFO keys and all tie-breaks. Unique per
    /// request, so it also disambiguates recycled arena slots.
    pub arrival: u64,
    pub deps: DepProgress,
    /// Set while an execution runs this request.
    pub started: bool,
    /// A cancelled request stays in the arena until its inbound primitive
    /// fetches resolve, then unwinds.
    pub cancelled: bool,
    /// Lot dependency governing batch start, if any.
    pub lot: Option<DepIx>,
    /// Owning system-cell execution, for internal sub-requests.
    pub parent: Option<crate::sim::ExecId>,
}

impl Request {
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, RequestKind::Transport { .. })
    }
}
