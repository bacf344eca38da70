// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Liberty (.lib) reader for the power-related subset of the format.
//!
//! The file is first parsed into a generic tree of groups and attributes,
//! then interpreted into cells. It extracts:
//! - Units, `nom_voltage`, `voltage_map` and operating conditions
//! - Lookup-table templates and `internal_power` rise/fall energy tables
//! - Pin direction, `function`, capacitance and related power pins
//! - `ff`/`latch` groups with their hidden `IQ`/`IQN` outputs
//! - Integrated clock-gate pin roles
//! - `leakage_power` groups and `cell_leakage_power`
//!
//! All values are converted to SI units (s, F, V, J, W) on load.

use crate::error::{Error, Result};
use crate::funcexpr::{FuncExpr, TimingSense};
use compact_str::CompactString;
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiseFall {
    Rise,
    Fall,
}

impl RiseFall {
    pub const ALL: [RiseFall; 2] = [RiseFall::Rise, RiseFall::Fall];

    pub fn opposite(self) -> RiseFall {
        match self {
            RiseFall::Rise => RiseFall::Fall,
            RiseFall::Fall => RiseFall::Rise,
        }
    }

    pub fn index(self) -> usize {
        match self {
            RiseFall::Rise => 0,
            RiseFall::Fall => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortDirection {
    Input,
    Output,
    Inout,
    Internal,
    #[default]
    Unknown,
}

impl PortDirection {
    pub fn from_liberty(value: &str) -> PortDirection {
        match value {
            "input" => PortDirection::Input,
            "output" => PortDirection::Output,
            "inout" => PortDirection::Inout,
            "internal" => PortDirection::Internal,
            _ => PortDirection::Unknown,
        }
    }

    pub fn is_input(self) -> bool {
        matches!(self, PortDirection::Input | PortDirection::Inout)
    }

    pub fn is_output(self) -> bool {
        matches!(self, PortDirection::Output | PortDirection::Inout)
    }
}

/// What a table axis is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableVariable {
    InputTransitionTime,
    TotalOutputNetCapacitance,
    Other,
}

impl TableVariable {
    fn from_liberty(value: &str) -> TableVariable {
        match value {
            "input_transition_time" | "input_net_transition" | "related_pin_transition" => {
                TableVariable::InputTransitionTime
            }
            "total_output_net_capacitance" | "related_out_total_output_net_capacitance" => {
                TableVariable::TotalOutputNetCapacitance
            }
            _ => TableVariable::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableAxis {
    pub variable: TableVariable,
    pub values: Vec<f64>,
}

/// Energy lookup table with up to two axes, values in joules.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerTable {
    axes: Vec<TableAxis>,
    values: Vec<f64>,
}

/// Lower bracket index and interpolation fraction of `x` on `axis`.
/// Points outside the axis extrapolate from the end segment.
fn axis_position(axis: &[f64], x: f64) -> (usize, f64) {
    if axis.len() < 2 {
        return (0, 0.0);
    }
    let last = axis.len() - 2;
    let i = axis[1..=last]
        .iter()
        .take_while(|&&v| v <= x)
        .count()
        .min(last);
    let span = axis[i + 1] - axis[i];
    if span == 0.0 {
        (i, 0.0)
    } else {
        (i, (x - axis[i]) / span)
    }
}

impl PowerTable {
    pub fn scalar(value: f64) -> Self {
        PowerTable {
            axes: Vec::new(),
            values: vec![value],
        }
    }

    /// Build a table; `values` is row-major over the axes and must hold
    /// exactly the product of the axis lengths.
    pub fn new(axes: Vec<TableAxis>, values: Vec<f64>) -> Option<Self> {
        let expected: usize = axes.iter().map(|a| a.values.len()).product();
        if axes.len() > 2 || expected == 0 || expected != values.len() {
            return None;
        }
        Some(PowerTable { axes, values })
    }

    pub fn axes(&self) -> &[TableAxis] {
        &self.axes
    }

    fn axis_input(axis: &TableAxis, slew: f64, load_cap: f64) -> f64 {
        match axis.variable {
            TableVariable::InputTransitionTime => slew,
            TableVariable::TotalOutputNetCapacitance => load_cap,
            TableVariable::Other => 0.0,
        }
    }

    /// Interpolated energy at the given input transition and output load.
    pub fn lookup(&self, slew: f64, load_cap: f64) -> f64 {
        match self.axes.as_slice() {
            [] => self.values[0],
            [axis] => {
                let x = Self::axis_input(axis, slew, load_cap);
                let (i, frac) = axis_position(&axis.values, x);
                let v0 = self.values[i];
                let v1 = self.values[(i + 1).min(self.values.len() - 1)];
                v0 + frac * (v1 - v0)
            }
            [axis1, axis2] => {
                let cols = axis2.values.len();
                let rows = axis1.values.len();
                let (i, fi) = axis_position(&axis1.values, Self::axis_input(axis1, slew, load_cap));
                let (j, fj) = axis_position(&axis2.values, Self::axis_input(axis2, slew, load_cap));
                let i1 = (i + 1).min(rows - 1);
                let j1 = (j + 1).min(cols - 1);
                let at = |r: usize, c: usize| self.values[r * cols + c];
                let lo = at(i, j) + fj * (at(i, j1) - at(i, j));
                let hi = at(i1, j) + fj * (at(i1, j1) - at(i1, j));
                lo + fi * (hi - lo)
            }
            _ => 0.0,
        }
    }
}

/// One `internal_power` group of a pin.
#[derive(Debug, Clone, Default)]
pub struct InternalPower {
    pub related_pin: Option<CompactString>,
    pub when: Option<FuncExpr>,
    pub related_pg_pin: Option<CompactString>,
    pub rise: Option<PowerTable>,
    pub fall: Option<PowerTable>,
}

impl InternalPower {
    pub fn table(&self, rf: RiseFall) -> Option<&PowerTable> {
        match rf {
            RiseFall::Rise => self.rise.as_ref(),
            RiseFall::Fall => self.fall.as_ref(),
        }
    }

    /// Energy per transition in joules; `None` when the edge has no table.
    pub fn energy(&self, rf: RiseFall, slew: f64, load_cap: f64) -> Option<f64> {
        self.table(rf).map(|t| t.lookup(slew, load_cap))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeakagePower {
    pub when: Option<FuncExpr>,
    pub related_pg_pin: Option<CompactString>,
    /// Watts.
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequentialKind {
    Register,
    Latch,
}

/// An `ff` or `latch` group.
#[derive(Debug, Clone)]
pub struct Sequential {
    pub kind: SequentialKind,
    pub output: CompactString,
    pub output_inv: Option<CompactString>,
    /// `next_state` for registers, `data_in` for latches.
    pub data: Option<FuncExpr>,
    /// `clocked_on` for registers, `enable` for latches.
    pub clock: Option<FuncExpr>,
    pub clear: Option<FuncExpr>,
    pub preset: Option<FuncExpr>,
}

#[derive(Debug, Clone, Default)]
pub struct TimingArcInfo {
    pub related_pin: CompactString,
    pub timing_type: Option<CompactString>,
    pub sense: Option<TimingSense>,
}

#[derive(Debug, Clone, Default)]
pub struct LibertyPin {
    pub name: CompactString,
    pub direction: PortDirection,
    pub function: Option<FuncExpr>,
    pub is_clock: bool,
    /// Farads.
    pub capacitance: f64,
    pub related_power_pin: Option<CompactString>,
    pub related_ground_pin: Option<CompactString>,
    pub clock_gate_clock_pin: bool,
    pub clock_gate_enable_pin: bool,
    pub clock_gate_out_pin: bool,
    pub internal_powers: Vec<InternalPower>,
    pub timing_arcs: Vec<TimingArcInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct PgPin {
    pub name: CompactString,
    pub voltage_name: Option<CompactString>,
    pub pg_type: Option<CompactString>,
}

/// Pin names of an integrated clock-gating cell.
#[derive(Debug, Clone, Copy)]
pub struct ClockGatePins<'a> {
    pub clock: &'a str,
    pub enable: &'a str,
    pub out: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct LibertyCell {
    pub name: CompactString,
    pub area: f64,
    pub pins: IndexMap<CompactString, LibertyPin>,
    pub pg_pins: IndexMap<CompactString, PgPin>,
    pub sequentials: Vec<Sequential>,
    pub leakage_powers: Vec<LeakagePower>,
    /// Watts.
    pub cell_leakage_power: Option<f64>,
    pub is_macro: bool,
    pub is_memory: bool,
    pub is_pad: bool,
    pub interface_timing: bool,
    pub clock_gating: Option<CompactString>,
}

impl LibertyCell {
    pub fn pin(&self, name: &str) -> Option<&LibertyPin> {
        self.pins.get(name)
    }

    pub fn has_sequentials(&self) -> bool {
        !self.sequentials.is_empty()
    }

    pub fn is_clock_gate(&self) -> bool {
        self.clock_gating.is_some()
    }

    /// Internal ports are the hidden state of `ff`/`latch` groups and pins
    /// declared with direction `internal`.
    pub fn is_internal_port(&self, name: &str) -> bool {
        self.sequentials
            .iter()
            .any(|s| s.output == name || s.output_inv.as_deref() == Some(name))
            || self
                .pins
                .get(name)
                .is_some_and(|p| p.direction == PortDirection::Internal)
    }

    pub fn clock_gate_pins(&self) -> Option<ClockGatePins<'_>> {
        if !self.is_clock_gate() {
            return None;
        }
        let find = |pred: fn(&LibertyPin) -> bool| {
            self.pins.values().find(|p| pred(*p)).map(|p| p.name.as_str())
        };
        Some(ClockGatePins {
            clock: find(|p| p.clock_gate_clock_pin)?,
            enable: find(|p| p.clock_gate_enable_pin)?,
            out: find(|p| p.clock_gate_out_pin)?,
        })
    }

    /// Unateness of the arc `from -> to`, preferring the characterized
    /// `timing_sense` over the one derived from the output function.
    pub fn timing_sense(&self, from: &str, to: &str) -> TimingSense {
        let Some(pin) = self.pins.get(to) else {
            return TimingSense::Unknown;
        };
        let characterized = pin
            .timing_arcs
            .iter()
            .filter(|arc| arc.related_pin == from)
            .find_map(|arc| arc.sense);
        if let Some(sense) = characterized {
            return sense;
        }
        match &pin.function {
            Some(func) => func.unateness(from),
            None => TimingSense::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperatingConditions {
    pub name: CompactString,
    pub process: f64,
    /// Volts.
    pub voltage: f64,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TableTemplate {
    pub variables: Vec<TableVariable>,
    pub indices: Vec<Vec<f64>>,
}

/// A parsed Liberty library.
#[derive(Debug, Clone, Default)]
pub struct LibertyLibrary {
    pub name: CompactString,
    /// Seconds per library time unit.
    pub time_scale: f64,
    /// Farads per library capacitance unit.
    pub cap_scale: f64,
    /// Volts per library voltage unit.
    pub voltage_scale: f64,
    /// Watts per library leakage unit.
    pub leakage_scale: f64,
    /// Volts.
    pub nom_voltage: Option<f64>,
    pub voltage_map: IndexMap<CompactString, f64>,
    pub operating_conditions: IndexMap<CompactString, OperatingConditions>,
    pub default_operating_conditions: Option<CompactString>,
    pub templates: IndexMap<CompactString, TableTemplate>,
    pub cells: IndexMap<CompactString, LibertyCell>,
}

impl LibertyLibrary {
    /// Load a Liberty library from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let lib = Self::parse(&content)?;
        clilog::info!(
            "read liberty library {} with {} cells from {}",
            lib.name,
            lib.cells.len(),
            path.display()
        );
        Ok(lib)
    }

    /// Parse Liberty content from a string.
    pub fn parse(content: &str) -> Result<Self> {
        let mut parser = LibertyParser::new(content);
        let root = parser.parse_library()?;
        Ok(LibraryBuilder::build(&root))
    }

    pub fn cell(&self, name: &str) -> Option<&LibertyCell> {
        self.cells.get(name)
    }

    pub fn supply_voltage(&self, name: &str) -> Option<f64> {
        self.voltage_map.get(name).copied()
    }

    /// Voltage of the named operating conditions, falling back to the
    /// library default conditions and then `nom_voltage`.
    pub fn operating_voltage(&self, conditions: Option<&str>) -> Option<f64> {
        conditions
            .and_then(|name| self.operating_conditions.get(name))
            .or_else(|| {
                self.default_operating_conditions
                    .as_deref()
                    .and_then(|name| self.operating_conditions.get(name))
            })
            .map(|oc| oc.voltage)
            .or(self.nom_voltage)
    }

    /// Supply voltage seen by a cell pin: its related power pin's
    /// `voltage_name` in the voltage map, else the operating voltage.
    pub fn pin_voltage(
        &self,
        cell: &LibertyCell,
        pin: &LibertyPin,
        conditions: Option<&str>,
    ) -> f64 {
        pin.related_power_pin
            .as_deref()
            .and_then(|pg| cell.pg_pins.get(pg))
            .and_then(|pg| pg.voltage_name.as_deref())
            .and_then(|name| self.supply_voltage(name))
            .or_else(|| self.operating_voltage(conditions))
            .unwrap_or(0.0)
    }
}

/// All libraries loaded for a run; cell lookup takes the first match.
#[derive(Debug, Clone, Default)]
pub struct LibrarySet {
    libraries: Vec<LibertyLibrary>,
}

impl LibrarySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, lib: LibertyLibrary) {
        self.libraries.push(lib);
    }

    pub fn find_cell(&self, name: &str) -> Option<(&LibertyLibrary, &LibertyCell)> {
        self.libraries
            .iter()
            .find_map(|lib| lib.cell(name).map(|cell| (lib, cell)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LibertyLibrary> {
        self.libraries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

impl From<LibertyLibrary> for LibrarySet {
    fn from(lib: LibertyLibrary) -> Self {
        LibrarySet {
            libraries: vec![lib],
        }
    }
}

/// Generic Liberty group: `kind (args) { attributes; groups }`.
#[derive(Debug, Clone, Default)]
struct Group {
    kind: String,
    args: Vec<String>,
    attrs: Vec<(String, String)>,
    complex: Vec<(String, Vec<String>)>,
    groups: Vec<Group>,
}

impl Group {
    fn name(&self) -> &str {
        self.args.first().map(|s| s.as_str()).unwrap_or("")
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn flag(&self, name: &str) -> bool {
        self.attr(name) == Some("true")
    }

    fn float(&self, name: &str) -> Option<f64> {
        self.attr(name).and_then(|v| v.parse::<f64>().ok())
    }

    fn complex_attr(&self, name: &str) -> Option<&[String]> {
        self.complex
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }

    fn groups_of<'s>(&'s self, kind: &'s str) -> impl Iterator<Item = &'s Group> + 's {
        self.groups.iter().filter(move |g| g.kind == kind)
    }

    fn expr(&self, name: &str) -> Option<FuncExpr> {
        let text = self.attr(name)?;
        match FuncExpr::parse(text) {
            Ok(expr) => Some(expr),
            Err(e) => {
                clilog::warn!("ignoring {} of {} {}: {}", name, self.kind, self.name(), e);
                None
            }
        }
    }
}

/// Parse "1ns", "1mV", "1nW", "1pf": a number followed by an SI prefix and
/// the base unit letter. Returns the scale in base units.
fn parse_unit(value: &str, base: char) -> Option<f64> {
    let value = value.trim().to_ascii_lowercase();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (num, unit) = value.split_at(split);
    let num = if num.is_empty() {
        1.0
    } else {
        num.parse::<f64>().ok()?
    };
    let prefix = unit.trim().strip_suffix(base)?;
    let scale = match prefix {
        "" => 1.0,
        "k" => 1e3,
        "m" => 1e-3,
        "u" => 1e-6,
        "n" => 1e-9,
        "p" => 1e-12,
        "f" => 1e-15,
        _ => return None,
    };
    Some(num * scale)
}

fn parse_float_list(items: &[String]) -> Vec<f64> {
    items
        .iter()
        .flat_map(|s| s.split([',', ' ', '\t', '\n', '\r', '\\']))
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<f64>().ok())
        .collect()
}

/// Turns the generic group tree into typed library data.
struct LibraryBuilder {
    lib: LibertyLibrary,
}

impl LibraryBuilder {
    fn energy_scale(&self) -> f64 {
        self.lib.cap_scale * self.lib.voltage_scale * self.lib.voltage_scale
    }

    fn build(root: &Group) -> LibertyLibrary {
        let mut lib = LibertyLibrary {
            name: root.name().into(),
            // used when the library leaves a unit out
            time_scale: 1e-9,
            cap_scale: 1e-12,
            voltage_scale: 1.0,
            leakage_scale: 1e-9,
            ..Default::default()
        };
        if let Some(s) = root.attr("time_unit").and_then(|v| parse_unit(v, 's')) {
            lib.time_scale = s;
        }
        if let Some(s) = root.attr("voltage_unit").and_then(|v| parse_unit(v, 'v')) {
            lib.voltage_scale = s;
        }
        if let Some(s) = root.attr("leakage_power_unit").and_then(|v| parse_unit(v, 'w')) {
            lib.leakage_scale = s;
        }
        if let Some([num, unit]) = root.complex_attr("capacitive_load_unit") {
            if let Some(s) = parse_unit(&format!("{}{}", num.trim(), unit.trim()), 'f') {
                lib.cap_scale = s;
            }
        }
        lib.nom_voltage = root.float("nom_voltage").map(|v| v * lib.voltage_scale);
        lib.default_operating_conditions = root.attr("default_operating_conditions").map(Into::into);

        for (name, args) in root.complex.iter().filter(|(k, _)| k == "voltage_map") {
            if let [supply, volts] = args.as_slice() {
                match volts.trim().parse::<f64>() {
                    Ok(v) => {
                        lib.voltage_map.insert(supply.as_str().into(), v * lib.voltage_scale);
                    }
                    Err(_) => {
                        clilog::warn!("bad {} value {:?}", name, volts);
                    }
                }
            }
        }
        for oc in root.groups_of("operating_conditions") {
            let conditions = OperatingConditions {
                name: oc.name().into(),
                process: oc.float("process").unwrap_or(1.0),
                voltage: oc.float("voltage").unwrap_or(0.0) * lib.voltage_scale,
                temperature: oc.float("temperature").unwrap_or(25.0),
            };
            lib.operating_conditions.insert(conditions.name.clone(), conditions);
        }
        for tpl in root
            .groups
            .iter()
            .filter(|g| g.kind == "lu_table_template" || g.kind == "power_lut_template")
        {
            let mut template = TableTemplate::default();
            for k in 1..=3 {
                match tpl.attr(&format!("variable_{}", k)) {
                    Some(v) => template.variables.push(TableVariable::from_liberty(v)),
                    None => break,
                }
            }
            for k in 1..=template.variables.len() {
                let index = tpl
                    .complex_attr(&format!("index_{}", k))
                    .map(parse_float_list)
                    .unwrap_or_default();
                template.indices.push(index);
            }
            lib.templates.insert(tpl.name().into(), template);
        }

        let mut builder = LibraryBuilder { lib };
        for cell in root.groups_of("cell") {
            let cell = builder.build_cell(cell);
            builder.lib.cells.insert(cell.name.clone(), cell);
        }
        builder.lib
    }

    fn build_cell(&self, group: &Group) -> LibertyCell {
        let mut cell = LibertyCell {
            name: group.name().into(),
            area: group.float("area").unwrap_or(0.0),
            is_macro: group.flag("is_macro_cell"),
            is_memory: group.flag("is_memory_cell") || group.groups_of("memory").next().is_some(),
            is_pad: group.flag("pad_cell") || group.flag("is_pad"),
            interface_timing: group.flag("interface_timing"),
            clock_gating: group
                .attr("clock_gating_integrated_cell")
                .filter(|v| !v.is_empty())
                .map(Into::into),
            cell_leakage_power: group
                .float("cell_leakage_power")
                .map(|v| v * self.lib.leakage_scale),
            ..Default::default()
        };

        for sub in &group.groups {
            match sub.kind.as_str() {
                "pin" => self.add_pins(&mut cell, sub, None),
                "bus" | "bundle" => {
                    let direction = sub.attr("direction").map(PortDirection::from_liberty);
                    for pin in sub.groups_of("pin") {
                        self.add_pins(&mut cell, pin, direction);
                    }
                }
                "pg_pin" => {
                    let pg = PgPin {
                        name: sub.name().into(),
                        voltage_name: sub.attr("voltage_name").map(Into::into),
                        pg_type: sub.attr("pg_type").map(Into::into),
                    };
                    cell.pg_pins.insert(pg.name.clone(), pg);
                }
                "ff" | "latch" => {
                    let register = sub.kind == "ff";
                    let Some(output) = sub.args.first().filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    cell.sequentials.push(Sequential {
                        kind: if register {
                            SequentialKind::Register
                        } else {
                            SequentialKind::Latch
                        },
                        output: output.as_str().into(),
                        output_inv: sub.args.get(1).filter(|s| !s.is_empty()).map(|s| s.as_str().into()),
                        data: sub.expr(if register { "next_state" } else { "data_in" }),
                        clock: sub.expr(if register { "clocked_on" } else { "enable" }),
                        clear: sub.expr("clear"),
                        preset: sub.expr("preset"),
                    });
                }
                "leakage_power" => {
                    cell.leakage_powers.push(LeakagePower {
                        when: sub.expr("when"),
                        related_pg_pin: sub.attr("related_pg_pin").map(Into::into),
                        value: sub.float("value").unwrap_or(0.0) * self.lib.leakage_scale,
                    });
                }
                _ => {}
            }
        }
        cell
    }

    fn add_pins(&self, cell: &mut LibertyCell, group: &Group, bus_direction: Option<PortDirection>) {
        let direction = group
            .attr("direction")
            .map(PortDirection::from_liberty)
            .or(bus_direction)
            .unwrap_or_default();
        let capacitance = group.float("capacitance").or_else(|| {
            match (group.float("rise_capacitance"), group.float("fall_capacitance")) {
                (Some(r), Some(f)) => Some((r + f) / 2.0),
                (r, f) => r.or(f),
            }
        });
        let mut internal_powers = Vec::new();
        for ip in group.groups_of("internal_power") {
            self.add_internal_powers(&mut internal_powers, ip);
        }
        let timing_arcs: Vec<TimingArcInfo> = group
            .groups_of("timing")
            .flat_map(|t| {
                let timing_type = t.attr("timing_type").map(CompactString::from);
                let sense = t.attr("timing_sense").map(TimingSense::from_liberty);
                t.attr("related_pin")
                    .unwrap_or("")
                    .split_whitespace()
                    .map(move |related| TimingArcInfo {
                        related_pin: related.into(),
                        timing_type: timing_type.clone(),
                        sense,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for name in &group.args {
            let pin = LibertyPin {
                name: name.as_str().into(),
                direction,
                function: group.expr("function"),
                is_clock: group.flag("clock"),
                capacitance: capacitance.unwrap_or(0.0) * self.lib.cap_scale,
                related_power_pin: group.attr("related_power_pin").map(Into::into),
                related_ground_pin: group.attr("related_ground_pin").map(Into::into),
                clock_gate_clock_pin: group.flag("clock_gate_clock_pin"),
                clock_gate_enable_pin: group.flag("clock_gate_enable_pin"),
                clock_gate_out_pin: group.flag("clock_gate_out_pin"),
                internal_powers: internal_powers.clone(),
                timing_arcs: timing_arcs.clone(),
            };
            cell.pins.insert(pin.name.clone(), pin);
        }
    }

    fn add_internal_powers(&self, out: &mut Vec<InternalPower>, group: &Group) {
        let mut rise = None;
        let mut fall = None;
        for table in &group.groups {
            match table.kind.as_str() {
                "rise_power" => rise = self.build_table(table),
                "fall_power" => fall = self.build_table(table),
                "power" => {
                    rise = self.build_table(table);
                    fall = rise.clone();
                }
                _ => {}
            }
        }
        let when = group.expr("when");
        let related_pg_pin: Option<CompactString> = group.attr("related_pg_pin").map(Into::into);
        let related: Vec<&str> = group
            .attr("related_pin")
            .map(|r| r.split_whitespace().collect())
            .unwrap_or_default();
        let make = |related_pin: Option<&str>| InternalPower {
            related_pin: related_pin.map(Into::into),
            when: when.clone(),
            related_pg_pin: related_pg_pin.clone(),
            rise: rise.clone(),
            fall: fall.clone(),
        };
        if related.is_empty() {
            out.push(make(None));
        } else {
            out.extend(related.into_iter().map(|r| make(Some(r))));
        }
    }

    fn build_table(&self, group: &Group) -> Option<PowerTable> {
        let energy = self.energy_scale();
        let values = parse_float_list(group.complex_attr("values").unwrap_or_default());
        let template = self.lib.templates.get(group.name());
        if group.name() == "scalar" || (template.is_none() && group.complex_attr("index_1").is_none()) {
            return values.first().map(|v| PowerTable::scalar(v * energy));
        }

        let mut axes = Vec::new();
        for k in 0..2 {
            let index = group
                .complex_attr(&format!("index_{}", k + 1))
                .map(parse_float_list)
                .or_else(|| template.and_then(|t| t.indices.get(k).cloned()))
                .filter(|index| !index.is_empty());
            let Some(index) = index else { break };
            let variable = template
                .and_then(|t| t.variables.get(k).copied())
                .unwrap_or(if k == 0 {
                    TableVariable::InputTransitionTime
                } else {
                    TableVariable::TotalOutputNetCapacitance
                });
            let scale = match variable {
                TableVariable::InputTransitionTime => self.lib.time_scale,
                TableVariable::TotalOutputNetCapacitance => self.lib.cap_scale,
                TableVariable::Other => 1.0,
            };
            axes.push(TableAxis {
                variable,
                values: index.into_iter().map(|v| v * scale).collect(),
            });
        }
        let scaled: Vec<f64> = values.iter().map(|v| v * energy).collect();
        let table = PowerTable::new(axes, scaled);
        if table.is_none() {
            clilog::warn!(
                "dropping {} table with {} values that do not match its axes",
                group.kind,
                values.len()
            );
        }
        table
    }
}

/// Liberty tokenizer and group-tree parser.
struct LibertyParser<'a> {
    content: &'a str,
    pos: usize,
}

impl<'a> LibertyParser<'a> {
    fn new(content: &'a str) -> Self {
        Self { content, pos: 0 }
    }

    fn error(&self, msg: impl Into<String>) -> Error {
        Error::Liberty {
            pos: self.pos,
            msg: msg.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.content.len() {
            let ch = self.content.as_bytes()[self.pos];
            if matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | b'\\') {
                self.pos += 1;
            } else if self.content[self.pos..].starts_with("/*") {
                if let Some(end) = self.content[self.pos..].find("*/") {
                    self.pos += end + 2;
                } else {
                    self.pos = self.content.len();
                }
            } else if self.content[self.pos..].starts_with("//") {
                if let Some(end) = self.content[self.pos..].find('\n') {
                    self.pos += end + 1;
                } else {
                    self.pos = self.content.len();
                }
            } else {
                break;
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.content[self.pos..].chars().next()
    }

    fn expect_char(&mut self, ch: char) -> Result<()> {
        self.skip_whitespace();
        if self.content[self.pos..].starts_with(ch) {
            self.pos += ch.len_utf8();
            Ok(())
        } else {
            let found = self.content[self.pos..].chars().next().unwrap_or('?');
            Err(self.error(format!("expected '{}', found '{}'", ch, found)))
        }
    }

    fn skip_optional(&mut self, ch: char) {
        if self.peek_char() == Some(ch) {
            self.pos += ch.len_utf8();
        }
    }

    fn read_identifier(&mut self) -> String {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.content.len() {
            let ch = self.content.as_bytes()[self.pos];
            if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$' || ch == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.content[start..self.pos].to_string()
    }

    fn read_string(&mut self) -> Result<String> {
        self.expect_char('"')?;
        let start = self.pos;
        while self.pos < self.content.len() && self.content.as_bytes()[self.pos] != b'"' {
            self.pos += 1;
        }
        if self.pos >= self.content.len() {
            return Err(self.error("unterminated string"));
        }
        let s = self.content[start..self.pos].to_string();
        self.pos += 1;
        Ok(s)
    }

    /// Read a quoted string or a bare token ending at `;`, `,`, `)`, `}`
    /// or a line break.
    fn read_value(&mut self) -> Result<String> {
        if self.peek_char() == Some('"') {
            return self.read_string();
        }
        let start = self.pos;
        while self.pos < self.content.len() {
            let ch = self.content.as_bytes()[self.pos];
            if matches!(ch, b';' | b',' | b')' | b'}' | b'\n') {
                break;
            }
            self.pos += 1;
        }
        Ok(self.content[start..self.pos].trim().to_string())
    }

    fn read_args(&mut self) -> Result<Vec<String>> {
        self.expect_char('(')?;
        let mut args = Vec::new();
        loop {
            if self.peek_char() == Some(')') {
                self.pos += 1;
                return Ok(args);
            }
            args.push(self.read_value()?);
            match self.peek_char() {
                Some(',') => self.pos += 1,
                Some(')') => {}
                Some(ch) => return Err(self.error(format!("unexpected '{}' in argument list", ch))),
                None => return Err(self.error("unexpected end of file in argument list")),
            }
        }
    }

    fn parse_library(&mut self) -> Result<Group> {
        let keyword = self.read_identifier();
        if keyword != "library" {
            return Err(self.error(format!("expected 'library', found '{}'", keyword)));
        }
        let mut lib = Group {
            kind: keyword,
            args: self.read_args()?,
            ..Default::default()
        };
        self.expect_char('{')?;
        self.parse_group_body(&mut lib)?;
        Ok(lib)
    }

    fn parse_group_body(&mut self, group: &mut Group) -> Result<()> {
        loop {
            match self.peek_char() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(());
                }
                None => return Err(self.error(format!("unterminated group {}", group.kind))),
                _ => self.parse_statement(group)?,
            }
        }
    }

    fn parse_statement(&mut self, parent: &mut Group) -> Result<()> {
        let name = self.read_identifier();
        if name.is_empty() {
            let found = self.peek_char().unwrap_or('?');
            return Err(self.error(format!("expected attribute or group, found '{}'", found)));
        }
        match self.peek_char() {
            Some(':') => {
                self.pos += 1;
                let value = self.read_value()?;
                self.skip_optional(';');
                parent.attrs.push((name, value));
            }
            Some('(') => {
                let args = self.read_args()?;
                if self.peek_char() == Some('{') {
                    self.pos += 1;
                    let mut group = Group {
                        kind: name,
                        args,
                        ..Default::default()
                    };
                    self.parse_group_body(&mut group)?;
                    parent.groups.push(group);
                } else {
                    self.skip_optional(';');
                    parent.complex.push((name, args));
                }
            }
            _ => {
                return Err(self.error(format!("expected ':' or '(' after '{}'", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
/* power test library */
library (sample) {
  time_unit : "1ns";
  voltage_unit : "1V";
  leakage_power_unit : "1nW";
  capacitive_load_unit (1, pf);
  nom_voltage : 1.8;
  voltage_map (VPWR, 1.5);
  voltage_map (VGND, 0.0);
  default_operating_conditions : tt;
  operating_conditions (tt) {
    process : 1.0;
    voltage : 1.6;
    temperature : 25;
  }
  power_lut_template (energy_2d) {
    variable_1 : input_transition_time;
    variable_2 : total_output_net_capacitance;
    index_1 ("0.1, 0.5");
    index_2 ("0.01, 0.05");
  }
  cell (nand2) {
    area : 3.75;
    cell_leakage_power : 5.0;
    pg_pin (VPWR) { voltage_name : VPWR; pg_type : primary_power; }
    leakage_power () { when : "A & B"; value : 10.0; }
    pin (A, B) {
      direction : input;
      capacitance : 0.002;
      internal_power () {
        power (scalar) { values ("0.5"); }
      }
    }
    pin (Y) {
      direction : output;
      function : "!(A & B)";
      related_power_pin : VPWR;
      timing () { related_pin : "A"; timing_sense : negative_unate; }
      internal_power () {
        related_pin : "A B";
        rise_power (energy_2d) {
          values ("1.0, 2.0", \
                  "3.0, 4.0");
        }
        fall_power (energy_2d) {
          index_1 ("0.1, 0.3");
          values ("1.0, 1.0", "1.0, 1.0");
        }
      }
    }
  }
  cell (dff) {
    ff (IQ, IQN) {
      next_state : "D";
      clocked_on : "CLK";
    }
    pin (CLK) { direction : input; clock : true; capacitance : 0.003; }
    pin (D) { direction : input; capacitance : 0.002; }
    pin (Q) { direction : output; function : "IQ"; }
  }
  cell (icg) {
    clock_gating_integrated_cell : "latch_posedge";
    pin (CLK) { direction : input; clock_gate_clock_pin : true; }
    pin (GATE) { direction : input; clock_gate_enable_pin : true; }
    pin (GCLK) { direction : output; clock_gate_out_pin : true; }
  }
}
"#;

    #[test]
    fn test_units_and_voltages() {
        let lib = LibertyLibrary::parse(SAMPLE).expect("sample parses");
        assert_eq!(lib.name, "sample");
        assert!((lib.time_scale - 1e-9).abs() < 1e-21);
        assert!((lib.cap_scale - 1e-12).abs() < 1e-24);
        assert!((lib.leakage_scale - 1e-9).abs() < 1e-21);
        assert_eq!(lib.supply_voltage("VPWR"), Some(1.5));
        assert_eq!(lib.operating_voltage(None), Some(1.6));
        assert_eq!(lib.nom_voltage, Some(1.8));
    }

    #[test]
    fn test_cell_contents() {
        let lib = LibertyLibrary::parse(SAMPLE).unwrap();
        let nand = lib.cell("nand2").unwrap();
        assert_eq!(nand.pins.len(), 3);
        let a = nand.pin("A").unwrap();
        assert_eq!(a.direction, PortDirection::Input);
        assert!((a.capacitance - 2e-15).abs() < 1e-27);
        assert_eq!(a.internal_powers.len(), 1);
        assert!(nand.pin("B").is_some());

        let y = nand.pin("Y").unwrap();
        assert_eq!(y.internal_powers.len(), 2);
        assert_eq!(y.internal_powers[1].related_pin.as_deref(), Some("B"));
        assert_eq!(nand.timing_sense("A", "Y"), TimingSense::NegativeUnate);
        assert_eq!(nand.timing_sense("B", "Y"), TimingSense::NegativeUnate);

        assert_eq!(nand.leakage_powers.len(), 1);
        assert!((nand.leakage_powers[0].value - 10e-9).abs() < 1e-18);
        assert!((nand.cell_leakage_power.unwrap() - 5e-9).abs() < 1e-18);
        assert_eq!(lib.pin_voltage(nand, y, None), 1.5);
        assert_eq!(lib.pin_voltage(nand, a, None), 1.6);
    }

    #[test]
    fn test_table_lookup() {
        let lib = LibertyLibrary::parse(SAMPLE).unwrap();
        let y = lib.cell("nand2").unwrap().pin("Y").unwrap();
        let rise = y.internal_powers[0].table(RiseFall::Rise).unwrap();
        // pJ energies at the grid corners
        let e = rise.lookup(0.1e-9, 0.01e-12);
        assert!((e - 1.0e-12).abs() < 1e-20);
        let e = rise.lookup(0.5e-9, 0.05e-12);
        assert!((e - 4.0e-12).abs() < 1e-20);
        // centre of the grid
        let e = rise.lookup(0.3e-9, 0.03e-12);
        assert!((e - 2.5e-12).abs() < 1e-20);
        // extrapolation beyond the slew axis
        let e = rise.lookup(0.9e-9, 0.01e-12);
        assert!((e - 5.0e-12).abs() < 1e-20);

        let a = lib.cell("nand2").unwrap().pin("A").unwrap();
        let scalar = a.internal_powers[0].energy(RiseFall::Fall, 0.0, 0.0).unwrap();
        assert!((scalar - 0.5e-12).abs() < 1e-20);
    }

    #[test]
    fn test_sequential_and_clock_gate() {
        let lib = LibertyLibrary::parse(SAMPLE).unwrap();
        let dff = lib.cell("dff").unwrap();
        assert!(dff.has_sequentials());
        assert!(dff.is_internal_port("IQ"));
        assert!(dff.is_internal_port("IQN"));
        assert!(!dff.is_internal_port("Q"));
        let seq = &dff.sequentials[0];
        assert_eq!(seq.kind, SequentialKind::Register);
        assert_eq!(seq.data.as_ref().and_then(|d| d.port()), Some("D"));
        assert!(dff.pin("CLK").unwrap().is_clock);

        let icg = lib.cell("icg").unwrap();
        let pins = icg.clock_gate_pins().unwrap();
        assert_eq!((pins.clock, pins.enable, pins.out), ("CLK", "GATE", "GCLK"));
        assert!(dff.clock_gate_pins().is_none());
    }

    #[test]
    fn test_syntax_error_position() {
        let err = LibertyLibrary::parse("library (x) { cell (a) { area : 1; ").unwrap_err();
        assert!(matches!(err, Error::Liberty { .. }));
        assert!(LibertyLibrary::parse("cell (a) { }").is_err());
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!(parse_unit("1ps", 's'), Some(1e-12));
        assert!((parse_unit("10ns", 's').unwrap() - 1e-8).abs() < 1e-20);
        assert_eq!(parse_unit("1mV", 'v'), Some(1e-3));
        assert_eq!(parse_unit("1ff", 'f'), Some(1e-15));
        assert_eq!(parse_unit("furlong", 's'), None);
    }
}
