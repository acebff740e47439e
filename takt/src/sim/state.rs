//! Breakdown, process-breakdown, shift-calendar and charging machinery.
//!
//! Interrupts preempt running executions: the remaining service time of the
//! current phase is frozen and resumed after repair, so no service time is
//! lost or double-counted. Pending requests on a broken resource may be
//! rerouted when an alternative resource exists.

use crate::sim::clock::Wake;
use crate::sim::engine::{PhaseKind, StateKind, World};
use crate::sim::log::{Activity, EventRecord, StateType};
use crate::sim::time_model::TimeContext;
use crate::sim::{ExecId, ProcIx, ResIx, StateIx, Token};
use hifitime::Duration;
use tracing::{debug, trace};

impl World {
    /// Arms the recurring state drivers and seeds per-resource setup state.
    pub(crate) fn start_state_drivers(&mut self) {
        for res_ix in 0..self.defs.resources.len() {
            let resource = ResIx(res_ix);
            // The first offered production process is the initial setup.
            self.resources[res_ix].current_setup = self.defs.resources[res_ix]
                .processes
                .iter()
                .copied()
                .find(|p| !self.defs.processes[p.0].is_transport());

            for state in self.defs.resources[res_ix].states.clone() {
                match self.defs.states[state.0].kind {
                    StateKind::BreakDown { interval, .. }
                    | StateKind::ProcessBreakDown { interval, .. } => {
                        if let Some(delta) = self.sample(interval, &TimeContext::default()) {
                            self.clock
                                .schedule_in(delta, Wake::BreakdownOnset { resource, state });
                        }
                    }
                    StateKind::NonScheduled { on_window, .. } => {
                        if let Some(delta) = self.sample(on_window, &TimeContext::default()) {
                            self.clock.schedule_in(
                                delta,
                                Wake::ShiftToggle {
                                    resource,
                                    state,
                                    to_available: false,
                                },
                            );
                        }
                    }
                    StateKind::Setup { .. } | StateKind::Charging { .. } => {}
                }
            }
        }
    }

    pub(crate) fn breakdown_onset(&mut self, resource: ResIx, state: StateIx) {
        let (interval, repair, scoped_process) = match self.defs.states[state.0].kind {
            StateKind::BreakDown { interval, repair } => (interval, repair, None),
            StateKind::ProcessBreakDown {
                interval,
                repair,
                process,
            } => (interval, repair, Some(process)),
            _ => return,
        };

        // Overlapping interrupts re-arm instead of stacking.
        let busy_with_interrupt = match scoped_process {
            None => self.resources[resource.0].down(),
            Some(p) => {
                self.resources[resource.0].down()
                    || self.resources[resource.0].process_down.contains(&p)
            }
        };
        if busy_with_interrupt {
            if let Some(delta) = self.sample(interval, &TimeContext::default()) {
                self.clock
                    .schedule_in(delta, Wake::BreakdownOnset { resource, state });
            }
            return;
        }

        let state_type = match scoped_process {
            None => StateType::Breakdown,
            Some(_) => StateType::ProcessBreakdown,
        };
        let repair_delta = self
            .sample(repair, &TimeContext::default())
            .unwrap_or(Duration::ZERO);
        let record = EventRecord::new(
            self.now_seconds(),
            self.defs.resources[resource.0].id.clone(),
            self.defs.states[state.0].id.clone(),
            Some(state_type),
            Activity::StartState,
        )
        .with_expected_end((self.now() + repair_delta).to_seconds());
        self.push_record(record);
        debug!(
            resource = %self.defs.resources[resource.0].id,
            state = %self.defs.states[state.0].id,
            "breakdown"
        );

        match scoped_process {
            None => {
                self.resources[resource.0].active_interrupts.push(state);
                self.interrupt_executions(resource, None);
                self.reroute_pending(resource);
            }
            Some(p) => {
                self.resources[resource.0].process_down.push(p);
                self.interrupt_executions(resource, Some(p));
            }
        }
        self.clock
            .schedule_in(repair_delta, Wake::BreakdownRepair { resource, state });
    }

    pub(crate) fn breakdown_repair(&mut self, resource: ResIx, state: StateIx) {
        let (interval, scoped_process) = match self.defs.states[state.0].kind {
            StateKind::BreakDown { interval, .. } => (interval, None),
            StateKind::ProcessBreakDown {
                interval, process, ..
            } => (interval, Some(process)),
            _ => return,
        };
        let state_type = match scoped_process {
            None => StateType::Breakdown,
            Some(_) => StateType::ProcessBreakdown,
        };
        let record = EventRecord::new(
            self.now_seconds(),
            self.defs.resources[resource.0].id.clone(),
            self.defs.states[state.0].id.clone(),
            Some(state_type),
            Activity::EndState,
        );
        self.push_record(record);

        match scoped_process {
            None => {
                self.resources[resource.0]
                    .active_interrupts
                    .retain(|s| *s != state);
            }
            Some(p) => {
                self.resources[resource.0].process_down.retain(|q| *q != p);
            }
        }
        self.resume_executions(resource);

        if let Some(delta) = self.sample(interval, &TimeContext::default()) {
            self.clock
                .schedule_in(delta, Wake::BreakdownOnset { resource, state });
        }
        self.clock.schedule_now(Wake::ControllerPoll(resource));
    }

    pub(crate) fn shift_toggle(&mut self, resource: ResIx, state: StateIx, to_available: bool) {
        let StateKind::NonScheduled {
            on_window,
            off_window,
        } = self.defs.states[state.0].kind
        else {
            return;
        };
        if to_available {
            let record = EventRecord::new(
                self.now_seconds(),
                self.defs.resources[resource.0].id.clone(),
                self.defs.states[state.0].id.clone(),
                Some(StateType::NonScheduled),
                Activity::EndState,
            );
            self.push_record(record);
            self.resources[resource.0]
                .active_interrupts
                .retain(|s| *s != state);
            self.resume_executions(resource);
            if let Some(delta) = self.sample(on_window, &TimeContext::default()) {
                self.clock.schedule_in(
                    delta,
                    Wake::ShiftToggle {
                        resource,
                        state,
                        to_available: false,
                    },
                );
            }
            self.clock.schedule_now(Wake::ControllerPoll(resource));
        } else {
            let off_delta = self
                .sample(off_window, &TimeContext::default())
                .unwrap_or(Duration::ZERO);
            let record = EventRecord::new(
                self.now_seconds(),
                self.defs.resources[resource.0].id.clone(),
                self.defs.states[state.0].id.clone(),
                Some(StateType::NonScheduled),
                Activity::StartState,
            )
            .with_expected_end((self.now() + off_delta).to_seconds());
            self.push_record(record);
            self.resources[resource.0].active_interrupts.push(state);
            self.interrupt_executions(resource, None);
            self.clock.schedule_in(
                off_delta,
                Wake::ShiftToggle {
                    resource,
                    state,
                    to_available: true,
                },
            );
        }
    }

    /// Called after every transport execution: crossing the battery
    /// threshold parks the transporter for a charging window.
    pub(crate) fn check_battery(&mut self, resource: ResIx) {
        for state in self.defs.resources[resource.0].states.clone() {
            let StateKind::Charging {
                duration,
                battery_capacity,
                threshold,
            } = self.defs.states[state.0].kind
            else {
                continue;
            };
            let used = self.resources[resource.0].battery_used;
            if used < battery_capacity * (1.0 - threshold) {
                continue;
            }
            if self.resources[resource.0].active_interrupts.contains(&state) {
                continue;
            }
            let charge = self
                .sample(duration, &TimeContext::default())
                .unwrap_or(Duration::ZERO);
            let record = EventRecord::new(
                self.now_seconds(),
                self.defs.resources[resource.0].id.clone(),
                self.defs.states[state.0].id.clone(),
                Some(StateType::Charging),
                Activity::StartState,
            )
            .with_expected_end((self.now() + charge).to_seconds());
            self.push_record(record);
            self.resources[resource.0].active_interrupts.push(state);
            self.interrupt_executions(resource, None);
            self.clock
                .schedule_in(charge, Wake::ChargingDone { resource, state });
        }
    }

    pub(crate) fn charging_done(&mut self, resource: ResIx, state: StateIx) {
        let record = EventRecord::new(
            self.now_seconds(),
            self.defs.resources[resource.0].id.clone(),
            self.defs.states[state.0].id.clone(),
            Some(StateType::Charging),
            Activity::EndState,
        );
        self.push_record(record);
        self.resources[resource.0].battery_used = 0.0;
        self.resources[resource.0]
            .active_interrupts
            .retain(|s| *s != state);
        self.resume_executions(resource);
        self.clock.schedule_now(Wake::ControllerPoll(resource));
    }

    // -- preemption ---------------------------------------------------------

    /// Freezes the remaining service time of affected executions. System
    /// chains carry no timer of their own; their children are interrupted
    /// through their own sub-resources.
    fn interrupt_executions(&mut self, resource: ResIx, scoped_process: Option<ProcIx>) {
        for exec in self.resources[resource.0].active_execs.clone() {
            let execution = &self.execs[exec.0];
            if execution.remaining.is_some() {
                continue;
            }
            if matches!(
                execution.current,
                Some(crate::sim::engine::Phase {
                    kind: PhaseKind::SystemChain { .. },
                    ..
                })
            ) {
                continue;
            }
            if let Some(p) = scoped_process
                && self.requests[execution.requests[0].0].process != p
            {
                continue;
            }
            // The interrupt record closes the interrupted service segment,
            // so it carries the service's own state type.
            let state_type = if self.requests[execution.requests[0].0].is_transport() {
                StateType::Transport
            } else {
                StateType::Production
            };
            let remaining = (self.execs[exec.0].phase_end - self.now()).max(Duration::ZERO);
            self.execs[exec.0].remaining = Some(remaining);
            self.execs[exec.0].generation += 1;
            trace!(?exec, ?remaining, "execution interrupted");
            self.log_interrupt(exec, state_type, Activity::StartInterruptState);
        }
    }

    /// Restarts frozen executions once no applicable interrupt remains.
    fn resume_executions(&mut self, resource: ResIx) {
        if self.resources[resource.0].down() {
            return;
        }
        for exec in self.resources[resource.0].active_execs.clone() {
            let execution = &self.execs[exec.0];
            let Some(remaining) = execution.remaining else {
                continue;
            };
            let process = self.requests[execution.requests[0].0].process;
            if self.resources[resource.0].process_down.contains(&process) {
                continue;
            }
            let state_type = if self.requests[execution.requests[0].0].is_transport() {
                StateType::Transport
            } else {
                StateType::Production
            };
            self.execs[exec.0].remaining = None;
            self.execs[exec.0].phase_end = self.now() + remaining;
            let generation = self.execs[exec.0].generation;
            self.clock
                .schedule_in(remaining, Wake::ExecAdvance { exec, generation });
            self.log_interrupt(exec, state_type, Activity::EndInterruptState);
        }
    }

    fn log_interrupt(&mut self, exec: ExecId, state_type: StateType, activity: Activity) {
        let resource = self.execs[exec.0].resource;
        for request in self.execs[exec.0].requests.clone() {
            let req = &self.requests[request.0];
            let process = req.process;
            let product = self.token_name(req.cargo);
            let record = EventRecord::new(
                self.now_seconds(),
                self.defs.resources[resource.0].id.clone(),
                self.defs.processes[process.0].id.clone(),
                Some(state_type),
                activity,
            )
            .with_product(product)
            .with_process(self.defs.processes[process.0].id.clone());
            self.push_record(record);
        }
    }

    /// On a resource-wide breakdown, pending production requests whose
    /// feed transport has not started are sent back to the router when an
    /// alternative resource exists.
    fn reroute_pending(&mut self, resource: ResIx) {
        for request in self.resources[resource.0].pending.clone() {
            let req = &self.requests[request.0];
            if req.is_transport() || req.started {
                continue;
            }
            let Token::Product(product) = req.cargo else {
                continue;
            };
            if self.matcher.production_candidates(req.required).len() <= 1 {
                continue;
            }
            let origin = req.origin;
            let mut reservation_outstanding = false;
            if let Some(t) = self.products[product.0].active_transport {
                if self.requests[t.0].started {
                    // Cargo is already moving here; let it land.
                    continue;
                }
                let transporter = self.requests[t.0].resource;
                self.resources[transporter.0].pending.retain(|r| *r != t);
                self.requests.remove(t.0);
                self.products[product.0].active_transport = None;
                reservation_outstanding = true;
            }
            trace!(
                product = %self.products[product.0].name,
                resource = %self.defs.resources[resource.0].id,
                "request rerouted away from broken resource"
            );
            self.cancel_planned_production(product);
            if reservation_outstanding {
                self.release_put(origin);
            }
            self.clock.schedule_now(Wake::RouterPlan(product));
        }
    }
}
