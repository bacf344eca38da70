// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Fixed-point activity propagation.
//!
//! Roots are seeded first, then a level-ordered sweep pushes activity
//! through wires and cell functions. The sweep stops at register
//! boundaries: registers whose inputs changed are collected as pending,
//! and each following pass seeds their hidden outputs from the data
//! function and sweeps again. Passes repeat until nothing is pending or
//! the pass cap is reached.

use crate::activity::{ActivityOrigin, ActivityRecord, ActivityStore, SequentialOutputKey};
use crate::bdd;
use crate::clocks::{ClockNetwork, ClockSet};
use crate::funcexpr::FuncExpr;
use crate::graph::{LevelQueue, SearchPolicy, TimingGraph};
use crate::liberty::{LibertyCell, LibertyLibrary, LibertyPin, LibrarySet, SequentialKind};
use crate::netlist::{Design, InstId, PinId};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

pub const MAX_ACTIVITY_PASSES: usize = 100;
pub const CHANGE_TOLERANCE: f64 = 0.01;

/// Input default density when no clock is defined: 0.1 per nanosecond.
const DEFAULT_INPUT_PERIOD: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub max_passes: usize,
    /// Relative change in density or duty that counts as a change.
    pub change_tolerance: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        PropagationConfig {
            max_passes: MAX_ACTIVITY_PASSES,
            change_tolerance: CHANGE_TOLERANCE,
        }
    }
}

/// Input activity used when none was set: a tenth of the fastest clock
/// rate at duty 0.5.
pub fn default_input_activity(clocks: &ClockSet) -> ActivityRecord {
    let period = clocks.min_period().unwrap_or(DEFAULT_INPUT_PERIOD);
    ActivityRecord::new(0.1 / period, 0.5, ActivityOrigin::Input)
}

/// Read-only view used to resolve activities of pins, cell ports and
/// hidden sequential outputs.
#[derive(Clone, Copy)]
pub struct ActivityContext<'a> {
    pub design: &'a Design,
    pub libraries: &'a LibrarySet,
    pub clocks: &'a ClockSet,
    pub clock_network: &'a ClockNetwork,
    pub store: &'a ActivityStore,
    pub global: Option<ActivityRecord>,
    pub input: ActivityRecord,
}

/// Library and cell of a leaf instance.
pub fn instance_cell<'a>(
    design: &'a Design,
    libraries: &'a LibrarySet,
    inst: InstId,
) -> Option<(&'a LibertyLibrary, &'a LibertyCell)> {
    let name = design.instance(inst)?.cell.as_deref()?;
    libraries.find_cell(name)
}

/// Instance, library, cell and liberty pin behind a leaf pin.
pub fn liberty_pin<'a>(
    design: &'a Design,
    libraries: &'a LibrarySet,
    pin: PinId,
) -> Option<(InstId, &'a LibertyLibrary, &'a LibertyCell, &'a LibertyPin)> {
    let p = design.pin(pin)?;
    let (lib, cell) = instance_cell(design, libraries, p.instance)?;
    let lib_pin = cell.pin(&p.port)?;
    Some((p.instance, lib, cell, lib_pin))
}

impl<'a> ActivityContext<'a> {
    pub fn cell(&self, inst: InstId) -> Option<(&'a LibertyLibrary, &'a LibertyCell)> {
        instance_cell(self.design, self.libraries, inst)
    }

    pub fn liberty_pin(
        &self,
        pin: PinId,
    ) -> Option<(InstId, &'a LibertyLibrary, &'a LibertyCell, &'a LibertyPin)> {
        liberty_pin(self.design, self.libraries, pin)
    }

    /// Activity of a pin: global override, constant, user overlay, clock
    /// network, then the propagated store.
    pub fn pin_activity(&self, pin: PinId) -> ActivityRecord {
        if let Some(global) = self.global {
            return global;
        }
        if let Some(value) = self.design.pin_constant(pin) {
            let duty = if value { 1.0 } else { 0.0 };
            return ActivityRecord::new(0.0, duty, ActivityOrigin::Constant);
        }
        if let Some(user) = self.store.user(pin) {
            return *user;
        }
        if let Some(clk) = self.clock_network.clock_of(pin) {
            if self.store.has(pin) {
                return self.store.get(pin);
            }
            return self.clocks.activity(clk);
        }
        self.store.get(pin)
    }

    /// Hidden output activity; the input default until a register pass
    /// has seeded it.
    pub fn seq_activity(&self, key: &SequentialOutputKey) -> ActivityRecord {
        if let Some(global) = self.global {
            return global;
        }
        self.store.get_seq(key).unwrap_or(self.input)
    }

    /// Activity seen at a cell port of `inst`.
    pub fn port_activity(&self, inst: InstId, port: &str) -> ActivityRecord {
        if self.cell(inst).is_some_and(|(_, cell)| cell.is_internal_port(port)) {
            return self.seq_activity(&SequentialOutputKey::new(inst, port));
        }
        match self.design.find_pin(inst, port) {
            Some(pin) => self.pin_activity(pin),
            None => ActivityRecord::unknown(),
        }
    }

    /// Output activity of a cell function on `inst`. A bare hidden port
    /// reads the sequential map directly.
    pub fn evaluate(&self, expr: &FuncExpr, inst: InstId) -> ActivityRecord {
        if let Some(port) = expr.port() {
            if self.cell(inst).is_some_and(|(_, cell)| cell.is_internal_port(port)) {
                return self
                    .seq_activity(&SequentialOutputKey::new(inst, port))
                    .with_origin(ActivityOrigin::Propagated);
            }
        }
        bdd::evaluate_activity(expr, |port| self.port_activity(inst, port))
    }

    /// Probability that `port` is observable through `expr` on `inst`.
    pub fn diff_duty(&self, expr: &FuncExpr, port: &str, inst: InstId) -> f64 {
        bdd::diff_duty(expr, port, |p| self.port_activity(inst, p))
    }

    /// Probability that `expr` holds on `inst`.
    pub fn expr_duty(&self, expr: &FuncExpr, inst: InstId) -> f64 {
        bdd::expr_duty(expr, |p| self.port_activity(inst, p))
    }
}

/// Outcome of one propagation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationStats {
    pub passes: usize,
    pub converged: bool,
}

pub struct Propagator<'a> {
    design: &'a Design,
    libraries: &'a LibrarySet,
    clocks: &'a ClockSet,
    graph: &'a TimingGraph,
    clock_network: &'a ClockNetwork,
    store: &'a mut ActivityStore,
    global: Option<ActivityRecord>,
    input: ActivityRecord,
    config: PropagationConfig,
    queue: LevelQueue,
    pending: IndexSet<InstId>,
}

impl<'a> Propagator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        design: &'a Design,
        libraries: &'a LibrarySet,
        clocks: &'a ClockSet,
        graph: &'a TimingGraph,
        clock_network: &'a ClockNetwork,
        store: &'a mut ActivityStore,
        global: Option<ActivityRecord>,
        input: ActivityRecord,
        config: PropagationConfig,
    ) -> Self {
        Propagator {
            design,
            libraries,
            clocks,
            graph,
            clock_network,
            store,
            global,
            input,
            config,
            queue: LevelQueue::new(graph.vertex_count()),
            pending: IndexSet::new(),
        }
    }

    fn ctx(&self) -> ActivityContext<'_> {
        ActivityContext {
            design: self.design,
            libraries: self.libraries,
            clocks: self.clocks,
            clock_network: self.clock_network,
            store: &*self.store,
            global: self.global,
            input: self.input,
        }
    }

    pub fn run(mut self) -> PropagationStats {
        let timer = clilog::stimer!("activity propagation");
        self.seed_roots();
        self.sweep();
        let mut passes = 1;
        let mut converged = true;
        while !self.pending.is_empty() {
            if passes >= self.config.max_passes {
                clilog::warn!(
                    "activity propagation stopped after {} passes with {} registers pending",
                    passes,
                    self.pending.len()
                );
                converged = false;
                break;
            }
            self.seed_register_outputs();
            self.sweep();
            passes += 1;
        }
        clilog::debug!(
            "activity propagation: {} passes, {} pins annotated",
            passes,
            self.store.propagated_count()
        );
        clilog::finish!(timer);
        PropagationStats { passes, converged }
    }

    fn seed_roots(&mut self) {
        let graph = self.graph;
        for &root in graph.roots() {
            let activity = self.root_activity(root);
            self.set_activity_check(root, activity);
            self.enqueue_fanout(root);
        }
    }

    fn root_activity(&self, root: PinId) -> ActivityRecord {
        if let Some(user) = self.store.user(root) {
            return *user;
        }
        if let Some(clk) = self.clocks.clock_for_source(root) {
            return self.clocks.activity(clk);
        }
        // tie cells and other input-less drivers
        let ctx = self.ctx();
        if self.design.is_driver(root) {
            if let Some((inst, _, _, lib_pin)) = ctx.liberty_pin(root) {
                if let Some(func) = &lib_pin.function {
                    return ctx.evaluate(func, inst);
                }
            }
        }
        self.input
    }

    fn sweep(&mut self) {
        while let Some((_, pins)) = self.queue.pop_level() {
            for pin in pins {
                self.visit(pin);
            }
        }
    }

    fn visit(&mut self, pin: PinId) {
        let Some(activity) = self.visit_activity(pin) else {
            return;
        };
        if self.set_activity_check(pin, activity) {
            self.on_change(pin);
        }
    }

    fn visit_activity(&self, pin: PinId) -> Option<ActivityRecord> {
        if let Some(user) = self.store.user(pin) {
            return Some(*user);
        }
        let ctx = self.ctx();
        if self.design.is_load(pin) {
            let driver = self.graph.wire_driver(pin)?;
            return Some(
                ctx.pin_activity(driver)
                    .with_origin(ActivityOrigin::Propagated),
            );
        }
        if !self.design.is_driver(pin) {
            return None;
        }
        let (inst, _, cell, lib_pin) = ctx.liberty_pin(pin)?;
        if let Some(gate) = cell.clock_gate_pins() {
            if gate.out == lib_pin.name {
                let clk = ctx.port_activity(inst, gate.clock);
                let en = ctx.port_activity(inst, gate.enable);
                return Some(ActivityRecord::new(
                    clk.density() * en.duty() + en.density() * clk.duty(),
                    clk.duty() * en.duty(),
                    ActivityOrigin::Propagated,
                ));
            }
        }
        let func = lib_pin.function.as_ref()?;
        Some(ctx.evaluate(func, inst))
    }

    /// Store `activity` when it differs from the current value by more than
    /// the tolerance. Returns whether it was stored.
    fn set_activity_check(&mut self, pin: PinId, activity: ActivityRecord) -> bool {
        let mut activity = activity;
        if let Some(slew) = self.design.min_slew(pin).filter(|&s| s > 0.0) {
            activity.set_density(activity.density().min(1.0 / slew));
        }
        let prev = self.store.get(pin);
        let tol = self.config.change_tolerance;
        let differs = |old: f64, new: f64| (old - new).abs() > tol * old.abs();
        let changed = prev.origin() != activity.origin()
            || differs(prev.density(), activity.density())
            || differs(prev.duty(), activity.duty());
        if changed {
            self.store.set(pin, activity);
        }
        changed
    }

    fn on_change(&mut self, pin: PinId) {
        if self.design.is_load(pin) {
            if let Some((inst, _, cell, _)) = liberty_pin(self.design, self.libraries, pin) {
                if cell.has_sequentials() {
                    self.pending.insert(inst);
                }
                if let Some(out) = cell
                    .clock_gate_pins()
                    .and_then(|gate| self.design.find_pin(inst, gate.out))
                {
                    self.queue.enqueue(self.graph, out);
                }
            }
        }
        self.enqueue_fanout(pin);
    }

    fn enqueue_fanout(&mut self, pin: PinId) {
        let graph = self.graph;
        for edge in graph.out_edges(pin) {
            if SearchPolicy::Activity.search_thru(edge) {
                self.queue.enqueue(graph, edge.to);
            }
        }
    }

    fn seed_register_outputs(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for inst in pending {
            let Some((_, cell)) = instance_cell(self.design, self.libraries, inst) else {
                continue;
            };
            let ctx = self.ctx();
            let mut seeded = Vec::new();
            for seq in &cell.sequentials {
                let Some(data) = &seq.data else { continue };
                let mut iq = ctx.evaluate(data, inst);
                match seq.kind {
                    SequentialKind::Register => {
                        if let Some(period) = self.register_period(inst, seq.clock.as_ref()) {
                            iq.set_density(iq.density().min(1.0 / period));
                        }
                    }
                    SequentialKind::Latch => {
                        let enable = seq
                            .clock
                            .as_ref()
                            .map(|en| ctx.expr_duty(en, inst))
                            .unwrap_or(1.0);
                        iq.set_density(iq.density() * enable);
                    }
                }
                let iq = iq.with_origin(ActivityOrigin::Propagated);
                seeded.push((SequentialOutputKey::new(inst, &seq.output), iq));
                if let Some(inv) = &seq.output_inv {
                    let iqn =
                        ActivityRecord::new(iq.density(), 1.0 - iq.duty(), ActivityOrigin::Propagated);
                    seeded.push((SequentialOutputKey::new(inst, inv), iqn));
                }
            }
            let outputs: Vec<PinId> = self
                .design
                .instance(inst)
                .map(|i| {
                    i.pins
                        .iter()
                        .copied()
                        .filter(|&pin| self.reads_hidden_output(pin, cell))
                        .collect()
                })
                .unwrap_or_default();
            for (key, activity) in seeded {
                self.store.set_seq(key, activity);
            }
            for pin in outputs {
                self.queue.enqueue(self.graph, pin);
            }
        }
    }

    /// Period of the clock reaching the first clock port of a register.
    fn register_period(&self, inst: InstId, clock: Option<&FuncExpr>) -> Option<f64> {
        let port = clock?.ports().into_iter().next()?;
        let pin = self.design.find_pin(inst, &port)?;
        let clk = self.clock_network.clock_of(pin)?;
        self.clocks.get(clk).map(|c| c.period).filter(|&p| p > 0.0)
    }

    fn reads_hidden_output(&self, pin: PinId, cell: &LibertyCell) -> bool {
        let Some(port) = self.design.pin(pin).map(|p| p.port.as_str()) else {
            return false;
        };
        let Some(func) = cell.pin(port).and_then(|p| p.function.as_ref()) else {
            return false;
        };
        cell.sequentials.iter().any(|seq| {
            func.has_port(&seq.output)
                || seq.output_inv.as_deref().is_some_and(|inv| func.has_port(inv))
        })
    }
}
