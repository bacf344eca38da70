// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! The power engine: activity settings, cached propagation and the
//! per-instance power estimator.
//!
//! Activities and instance powers are computed lazily and cached. Any
//! activity setting or topology edit invalidates both caches; the next
//! query rebuilds them from scratch.

use crate::activity::{ActivityOrigin, ActivityRecord, ActivityStore};
use crate::clocks::{ClockNetwork, ClockSet};
use crate::error::{Error, Result};
use crate::funcexpr::{FuncExpr, TimingSense};
use crate::graph::TimingGraph;
use crate::liberty::{InternalPower, LibertyCell, LibertyLibrary, LibertyPin, LibrarySet, RiseFall};
use crate::netlist::{Design, InstId, PinId};
use crate::propagate::{
    default_input_activity, ActivityContext, PropagationConfig, PropagationStats, Propagator,
};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Analysis corner: a name and an optional operating-conditions override
/// applied to every library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corner {
    pub name: CompactString,
    pub operating_conditions: Option<CompactString>,
}

impl Corner {
    pub fn new(name: &str) -> Self {
        Corner {
            name: name.into(),
            operating_conditions: None,
        }
    }

    pub fn with_operating_conditions(mut self, name: &str) -> Self {
        self.operating_conditions = Some(name.into());
        self
    }
}

impl Default for Corner {
    fn default() -> Self {
        Corner::new("default")
    }
}

/// Internal, switching and leakage power in watts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerResult {
    pub internal: f64,
    pub switching: f64,
    pub leakage: f64,
}

impl PowerResult {
    pub fn total(&self) -> f64 {
        self.internal + self.switching + self.leakage
    }

    pub fn incr(&mut self, other: &PowerResult) {
        self.internal += other.internal;
        self.switching += other.switching;
        self.leakage += other.leakage;
    }
}

impl AddAssign<&PowerResult> for PowerResult {
    fn add_assign(&mut self, other: &PowerResult) {
        self.incr(other);
    }
}

struct Topology {
    graph: TimingGraph,
    clock_network: ClockNetwork,
}

impl Topology {
    fn build(design: &Design, libraries: &LibrarySet, clocks: &ClockSet) -> Topology {
        let graph = TimingGraph::build(design, libraries);
        let clock_network = ClockNetwork::build(&graph, clocks);
        clilog::debug!("clock network: {} pins", clock_network.pin_count());
        Topology {
            graph,
            clock_network,
        }
    }
}

pub struct Power {
    design: Design,
    libraries: LibrarySet,
    clocks: ClockSet,
    config: PropagationConfig,
    store: ActivityStore,
    global: Option<ActivityRecord>,
    input: Option<ActivityRecord>,
    topology: Option<Topology>,
    activities_valid: bool,
    stats: Option<PropagationStats>,
    instance_powers: IndexMap<InstId, PowerResult>,
    powers_corner: Option<Corner>,
}

impl Power {
    pub fn new(design: Design, libraries: LibrarySet, clocks: ClockSet) -> Self {
        Power {
            design,
            libraries,
            clocks,
            config: PropagationConfig::default(),
            store: ActivityStore::new(),
            global: None,
            input: None,
            topology: None,
            activities_valid: false,
            stats: None,
            instance_powers: IndexMap::new(),
            powers_corner: None,
        }
    }

    pub fn with_config(mut self, config: PropagationConfig) -> Self {
        self.config = config;
        self.invalidate();
        self
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    /// Mutable access to the design. Cached topology and results are
    /// dropped.
    pub fn design_mut(&mut self) -> &mut Design {
        self.invalidate_topology();
        &mut self.design
    }

    pub fn libraries(&self) -> &LibrarySet {
        &self.libraries
    }

    pub fn clocks(&self) -> &ClockSet {
        &self.clocks
    }

    pub fn set_clocks(&mut self, clocks: ClockSet) {
        self.clocks = clocks;
        self.invalidate_topology();
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Statistics of the last propagation run.
    pub fn propagation_stats(&self) -> Option<PropagationStats> {
        self.stats
    }

    pub fn set_global_activity(&mut self, density: f64, duty: f64) -> Result<()> {
        self.global = Some(ActivityRecord::checked(density, duty, ActivityOrigin::Global)?);
        self.invalidate();
        Ok(())
    }

    pub fn unset_global_activity(&mut self) {
        self.global = None;
        self.invalidate();
    }

    pub fn global_activity(&self) -> Option<ActivityRecord> {
        self.global
    }

    /// Default activity of primary inputs without their own setting.
    pub fn set_input_activity(&mut self, density: f64, duty: f64) -> Result<()> {
        self.input = Some(ActivityRecord::checked(density, duty, ActivityOrigin::Input)?);
        self.invalidate();
        Ok(())
    }

    pub fn unset_input_activity(&mut self) {
        self.input = None;
        self.invalidate();
    }

    pub fn input_activity(&self) -> ActivityRecord {
        self.input
            .unwrap_or_else(|| default_input_activity(&self.clocks))
    }

    /// Activity of one top-level input port.
    pub fn set_input_port_activity(&mut self, port: PinId, density: f64, duty: f64) -> Result<()> {
        if !(self.design.is_top_level(port) && self.design.is_driver(port)) {
            return Err(Error::Netlist(format!(
                "{} is not a top-level input port",
                self.design.pin_path(port)
            )));
        }
        let activity = ActivityRecord::checked(density, duty, ActivityOrigin::Input)?;
        self.store.set_user(port, activity);
        self.invalidate();
        Ok(())
    }

    pub fn set_user_activity(
        &mut self,
        pin: PinId,
        density: f64,
        duty: f64,
        origin: ActivityOrigin,
    ) -> Result<()> {
        if self.design.pin(pin).is_none() {
            return Err(Error::Netlist(format!("no pin with id {}", pin)));
        }
        let activity = ActivityRecord::checked(density, duty, origin)?;
        self.store.set_user(pin, activity);
        self.invalidate();
        Ok(())
    }

    pub fn unset_user_activity(&mut self, pin: PinId) {
        if self.store.unset_user(pin).is_some() {
            self.invalidate();
        }
    }

    /// User-pinned activities, in the order they were set.
    pub fn user_activities(&self) -> impl Iterator<Item = (PinId, &ActivityRecord)> + '_ {
        self.store.user_activities()
    }

    /// Resolved activity of a pin, propagating first if needed.
    pub fn pin_activity(&mut self, pin: PinId) -> ActivityRecord {
        self.ensure_activities();
        match self.context() {
            Some(ctx) => ctx.pin_activity(pin),
            None => ActivityRecord::unknown(),
        }
    }

    /// Drop propagated activities and instance powers.
    pub fn invalidate(&mut self) {
        self.activities_valid = false;
        self.instance_powers.clear();
        self.powers_corner = None;
    }

    fn invalidate_topology(&mut self) {
        self.topology = None;
        self.invalidate();
    }

    /// Read-only resolution view. `None` until the topology is built.
    pub(crate) fn context(&self) -> Option<ActivityContext<'_>> {
        let topo = self.topology.as_ref()?;
        Some(ActivityContext {
            design: &self.design,
            libraries: &self.libraries,
            clocks: &self.clocks,
            clock_network: &topo.clock_network,
            store: &self.store,
            global: self.global,
            input: self.input_activity(),
        })
    }

    pub fn ensure_activities(&mut self) {
        if self.activities_valid && self.topology.is_some() {
            return;
        }
        let input = self.input_activity();
        let topo = self
            .topology
            .get_or_insert_with(|| Topology::build(&self.design, &self.libraries, &self.clocks));
        self.store.clear();
        let stats = Propagator::new(
            &self.design,
            &self.libraries,
            &self.clocks,
            &topo.graph,
            &topo.clock_network,
            &mut self.store,
            self.global,
            input,
            self.config,
        )
        .run();
        self.stats = Some(stats);
        self.activities_valid = true;
    }

    pub fn ensure_instance_powers(&mut self, corner: &Corner) {
        self.ensure_activities();
        if self.powers_corner.as_ref() == Some(corner) {
            return;
        }
        let timer = clilog::stimer!("instance power");
        let mut powers = IndexMap::new();
        if let Some(ctx) = self.context() {
            let estimator = PowerEstimator { ctx, corner };
            for inst in self.design.leaf_instances() {
                powers.insert(inst, estimator.instance_power(inst));
            }
        }
        clilog::debug!("computed power of {} instances", powers.len());
        self.instance_powers = powers;
        self.powers_corner = Some(corner.clone());
        clilog::finish!(timer);
    }

    /// Cached power of a leaf instance. Call `ensure_instance_powers` first.
    pub(crate) fn cached_instance_power(&self, inst: InstId) -> Option<&PowerResult> {
        self.instance_powers.get(&inst)
    }

    pub(crate) fn cached_instance_powers(&self) -> impl Iterator<Item = (InstId, &PowerResult)> + '_ {
        self.instance_powers.iter().map(|(&i, p)| (i, p))
    }

    /// Topology hook: an instance (and its subtree) is about to be deleted.
    pub fn delete_instance_before(&mut self, inst: InstId) {
        let mut stack = vec![inst];
        while let Some(id) = stack.pop() {
            let Some(instance) = self.design.instance(id) else {
                continue;
            };
            stack.extend(instance.children.iter().copied());
            let pins: Vec<PinId> = instance.pins.to_vec();
            for pin in pins {
                self.forget_pin(pin);
            }
            self.store.remove_instance(id);
        }
        self.invalidate_topology();
    }

    /// Topology hook: a pin is about to be deleted.
    pub fn delete_pin_before(&mut self, pin: PinId) {
        self.forget_pin(pin);
        self.invalidate_topology();
    }

    fn forget_pin(&mut self, pin: PinId) {
        self.store.remove_pin(pin);
        self.clocks.remove_source_pin(pin);
    }

    pub fn delete_instance(&mut self, inst: InstId) -> bool {
        self.delete_instance_before(inst);
        self.design.delete_instance(inst)
    }

    pub fn delete_pin(&mut self, pin: PinId) -> bool {
        self.delete_pin_before(pin);
        self.design.delete_pin(pin)
    }
}

/// Per-instance power from converged activities and liberty models.
pub(crate) struct PowerEstimator<'a> {
    ctx: ActivityContext<'a>,
    corner: &'a Corner,
}

impl<'a> PowerEstimator<'a> {
    fn instance_power(&self, inst: InstId) -> PowerResult {
        let mut result = PowerResult::default();
        let design = self.ctx.design;
        let (Some(instance), Some((lib, cell))) = (design.instance(inst), self.ctx.cell(inst))
        else {
            return result;
        };
        for &pin in &instance.pins {
            let Some(port) = design.pin(pin).map(|p| p.port.as_str()) else {
                continue;
            };
            let Some(lib_pin) = cell.pin(port) else {
                continue;
            };
            if design.is_load(pin) {
                result.internal += self.input_internal_power(inst, cell, pin, lib_pin);
            }
            if design.is_driver(pin) {
                let load_cap = self.load_cap(pin);
                result.internal += self.output_internal_power(inst, cell, pin, lib_pin, load_cap);
                result.switching += self.switching_power(lib, cell, pin, lib_pin, load_cap);
            }
        }
        result.leakage = self.leakage_power(inst, cell);
        clilog::trace!(
            "{} ({}): internal {:.3e} switching {:.3e} leakage {:.3e}",
            design.instance_path(inst),
            cell.name,
            result.internal,
            result.switching,
            result.leakage
        );
        result
    }

    /// Mean of the rise and fall energies that exist at finite slews.
    fn mean_energy(
        group: &InternalPower,
        slew_of: impl Fn(RiseFall) -> f64,
        load_cap: f64,
    ) -> f64 {
        let mut energy = 0.0;
        let mut count = 0;
        for rf in RiseFall::ALL {
            let slew = slew_of(rf);
            if !slew.is_finite() {
                continue;
            }
            if let Some(e) = group.energy(rf, slew, load_cap) {
                energy += e;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            energy / count as f64
        }
    }

    fn pin_slew(&self, pin: Option<PinId>, rf: RiseFall) -> f64 {
        pin.and_then(|p| self.ctx.design.pin_slew(p))
            .map(|s| s[rf.index()])
            .unwrap_or(0.0)
    }

    fn input_internal_power(
        &self,
        inst: InstId,
        cell: &LibertyCell,
        pin: PinId,
        lib_pin: &LibertyPin,
    ) -> f64 {
        if lib_pin.internal_powers.is_empty() {
            return 0.0;
        }
        let activity = self.ctx.pin_activity(pin);
        let port = lib_pin.name.as_str();
        let mut power = 0.0;
        for group in &lib_pin.internal_powers {
            let energy = Self::mean_energy(group, |rf| self.pin_slew(Some(pin), rf), 0.0);
            let duty = match &group.when {
                Some(when) => match self.output_function_with(cell, when, port) {
                    Some(func) => self.ctx.diff_duty(func, port, inst),
                    None => self.ctx.expr_duty(when, inst),
                },
                None => 1.0,
            };
            power += energy * duty * activity.density();
        }
        power
    }

    /// Function of an output named in `when` that depends on `port`.
    fn output_function_with<'c>(
        &self,
        cell: &'c LibertyCell,
        when: &FuncExpr,
        port: &str,
    ) -> Option<&'c FuncExpr> {
        when.ports().iter().find_map(|name| {
            cell.pin(name)
                .filter(|p| p.direction.is_output())
                .and_then(|p| p.function.as_ref())
                .filter(|f| f.has_port(port))
        })
    }

    fn output_internal_power(
        &self,
        inst: InstId,
        cell: &LibertyCell,
        pin: PinId,
        lib_pin: &LibertyPin,
        load_cap: f64,
    ) -> f64 {
        if lib_pin.internal_powers.is_empty() {
            return 0.0;
        }
        let design = self.ctx.design;
        let activity = self.ctx.pin_activity(pin);
        let func = lib_pin.function.as_ref();
        let related = |group: &InternalPower| -> Option<PinId> {
            group
                .related_pin
                .as_deref()
                .and_then(|rel| design.find_pin(inst, rel))
        };
        let from_density = |group: &InternalPower| -> f64 {
            related(group)
                .map(|p| self.ctx.pin_activity(p).density())
                .unwrap_or(0.0)
        };

        let groups: Vec<(&InternalPower, f64)> = lib_pin
            .internal_powers
            .iter()
            .map(|g| (g, self.input_duty(inst, cell, func, g)))
            .collect();
        let mut pg_duty_sum: IndexMap<Option<&str>, (f64, usize)> = IndexMap::new();
        for &(group, duty) in &groups {
            let entry = pg_duty_sum
                .entry(group.related_pg_pin.as_deref())
                .or_default();
            entry.0 += duty * from_density(group);
            entry.1 += 1;
        }

        let mut power = 0.0;
        for &(group, duty) in &groups {
            let (sum, count) = pg_duty_sum
                .get(&group.related_pg_pin.as_deref())
                .copied()
                .unwrap_or((0.0, 1));
            // rails with no switching input share equally
            let weight = if sum > 0.0 {
                duty * from_density(group) / sum
            } else {
                1.0 / count.max(1) as f64
            };
            let from_pin = related(group);
            let sense = group
                .related_pin
                .as_deref()
                .map(|rel| cell.timing_sense(rel, &lib_pin.name))
                .unwrap_or(TimingSense::Unknown);
            let energy = Self::mean_energy(
                group,
                |to_rf| {
                    let from_rf = if sense == TimingSense::NegativeUnate {
                        to_rf.opposite()
                    } else {
                        to_rf
                    };
                    self.pin_slew(from_pin, from_rf)
                },
                load_cap,
            );
            power += weight * energy * activity.density();
        }
        power
    }

    /// Sensitization probability of an internal power group's related pin.
    fn input_duty(
        &self,
        inst: InstId,
        cell: &LibertyCell,
        func: Option<&FuncExpr>,
        group: &InternalPower,
    ) -> f64 {
        let Some(rel) = group.related_pin.as_deref() else {
            return 0.0;
        };
        if let Some(func) = func.filter(|f| f.has_port(rel)) {
            return self.ctx.diff_duty(func, rel, inst);
        }
        if let Some(when) = &group.when {
            return self.ctx.expr_duty(when, inst);
        }
        if cell.pin(rel).is_some_and(|p| p.is_clock) {
            1.0
        } else {
            0.5
        }
    }

    /// Capacitance driven by `pin`: load pin capacitances, top-level port
    /// loads and the net's wire capacitance.
    fn load_cap(&self, pin: PinId) -> f64 {
        let design = self.ctx.design;
        let Some(net_id) = design.pin_net(pin) else {
            return 0.0;
        };
        let pins_cap: f64 = design
            .net_pins(net_id)
            .iter()
            .filter(|&&p| p != pin && design.is_load(p))
            .map(|&p| {
                if design.is_top_level(p) {
                    design.port_load(p)
                } else {
                    self.ctx
                        .liberty_pin(p)
                        .map(|(_, _, _, lib_pin)| lib_pin.capacitance)
                        .unwrap_or(0.0)
                }
            })
            .sum();
        let wire_cap = design.net(net_id).map(|n| n.wire_cap).unwrap_or(0.0);
        pins_cap + wire_cap
    }

    fn switching_power(
        &self,
        lib: &LibertyLibrary,
        cell: &LibertyCell,
        pin: PinId,
        lib_pin: &LibertyPin,
        load_cap: f64,
    ) -> f64 {
        let activity = self.ctx.pin_activity(pin);
        let voltage = lib.pin_voltage(cell, lib_pin, self.corner.operating_conditions.as_deref());
        0.5 * load_cap * voltage * voltage * activity.density()
    }

    fn leakage_power(&self, inst: InstId, cell: &LibertyCell) -> f64 {
        let mut cond_leakage = 0.0;
        let mut cond_duty_sum = 0.0;
        let mut found_cond = false;
        let mut uncond_leakage = 0.0;
        for group in &cell.leakage_powers {
            match &group.when {
                Some(when) => {
                    let duty = self.ctx.expr_duty(when, inst);
                    cond_leakage += group.value * duty;
                    cond_duty_sum += duty;
                    found_cond = true;
                }
                None => uncond_leakage += group.value,
            }
        }
        let mut leakage = if found_cond {
            cond_leakage
        } else {
            uncond_leakage
        };
        if let Some(cell_leakage) = cell.cell_leakage_power {
            leakage += cell_leakage * (1.0 - cond_duty_sum).max(0.0);
        }
        leakage
    }
}
