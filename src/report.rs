// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Power aggregation by category, per-instance queries and the activity
//! annotation report.

use crate::activity::ActivityOrigin;
use crate::netlist::{InstId, PinId};
use crate::power::{Corner, Power, PowerResult};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// Power category of a leaf instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerCategory {
    Sequential,
    Combinational,
    Clock,
    Macro,
    Pad,
}

/// Design power split into categories; `total` sums all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PowerSummary {
    pub total: PowerResult,
    pub sequential: PowerResult,
    pub combinational: PowerResult,
    pub clock: PowerResult,
    #[serde(rename = "macro")]
    pub macro_: PowerResult,
    pub pad: PowerResult,
}

impl PowerSummary {
    pub fn category(&self, category: PowerCategory) -> &PowerResult {
        match category {
            PowerCategory::Sequential => &self.sequential,
            PowerCategory::Combinational => &self.combinational,
            PowerCategory::Clock => &self.clock,
            PowerCategory::Macro => &self.macro_,
            PowerCategory::Pad => &self.pad,
        }
    }

    fn category_mut(&mut self, category: PowerCategory) -> &mut PowerResult {
        match category {
            PowerCategory::Sequential => &mut self.sequential,
            PowerCategory::Combinational => &mut self.combinational,
            PowerCategory::Clock => &mut self.clock,
            PowerCategory::Macro => &mut self.macro_,
            PowerCategory::Pad => &mut self.pad,
        }
    }
}

impl fmt::Display for PowerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Power Report ===")?;
        writeln!(
            f,
            "{:<16}{:>12}{:>12}{:>12}{:>12}{:>8}",
            "Group", "Internal", "Switching", "Leakage", "Total", "%"
        )?;
        let total = self.total.total();
        let rows = [
            ("Sequential", &self.sequential),
            ("Combinational", &self.combinational),
            ("Clock", &self.clock),
            ("Macro", &self.macro_),
            ("Pad", &self.pad),
        ];
        for (name, p) in rows {
            let pct = if total > 0.0 {
                100.0 * p.total() / total
            } else {
                0.0
            };
            writeln!(
                f,
                "{:<16}{:>12.3e}{:>12.3e}{:>12.3e}{:>12.3e}{:>7.1}%",
                name,
                p.internal,
                p.switching,
                p.leakage,
                p.total(),
                pct
            )?;
        }
        writeln!(
            f,
            "{:<16}{:>12.3e}{:>12.3e}{:>12.3e}{:>12.3e}",
            "Total",
            self.total.internal,
            self.total.switching,
            self.total.leakage,
            total
        )?;
        writeln!(f, "(Watts)")
    }
}

/// Pin counts by activity origin, plus the pin lists that were asked for.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityAnnotationReport {
    pub counts: IndexMap<ActivityOrigin, usize>,
    /// Pins carrying a user, input-port or VCD annotation.
    pub annotated: Vec<String>,
    /// Input ports and cell outputs without an annotation.
    pub unannotated: Vec<String>,
}

impl fmt::Display for ActivityAnnotationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Activity Annotation ===")?;
        for (origin, count) in &self.counts {
            if *count > 0 {
                writeln!(f, "{:<12}{:>8}", origin.name(), count)?;
            }
        }
        if !self.annotated.is_empty() {
            writeln!(f, "Annotated pins:")?;
            for pin in &self.annotated {
                writeln!(f, "  {}", pin)?;
            }
        }
        if !self.unannotated.is_empty() {
            writeln!(f, "Unannotated pins:")?;
            for pin in &self.unannotated {
                writeln!(f, "  {}", pin)?;
            }
        }
        Ok(())
    }
}

impl Power {
    /// Category of a leaf instance.
    pub fn classify(&self, inst: InstId) -> PowerCategory {
        let design = self.design();
        let Some(ctx) = self.context() else {
            return PowerCategory::Combinational;
        };
        let Some((_, cell)) = ctx.cell(inst) else {
            return PowerCategory::Combinational;
        };
        if cell.is_macro || cell.is_memory || cell.interface_timing {
            return PowerCategory::Macro;
        }
        if cell.is_pad {
            return PowerCategory::Pad;
        }
        let drivers: Vec<PinId> = design
            .instance(inst)
            .map(|i| {
                i.pins
                    .iter()
                    .copied()
                    .filter(|&p| design.is_driver(p))
                    .collect()
            })
            .unwrap_or_default();
        if !drivers.is_empty() && drivers.iter().all(|&p| ctx.clock_network.is_clock(p)) {
            return PowerCategory::Clock;
        }
        if cell.has_sequentials() {
            PowerCategory::Sequential
        } else {
            PowerCategory::Combinational
        }
    }

    /// Design power by category.
    pub fn power(&mut self, corner: &Corner) -> PowerSummary {
        self.ensure_instance_powers(corner);
        let mut summary = PowerSummary::default();
        for (inst, p) in self.cached_instance_powers() {
            summary.category_mut(self.classify(inst)).incr(p);
            summary.total.incr(p);
        }
        summary
    }

    /// Power of an instance; hierarchical instances sum their subtree.
    pub fn instance_power(&mut self, inst: InstId, corner: &Corner) -> PowerResult {
        self.ensure_instance_powers(corner);
        let mut result = PowerResult::default();
        let mut stack = vec![inst];
        while let Some(id) = stack.pop() {
            if let Some(p) = self.cached_instance_power(id) {
                result.incr(p);
            }
            if let Some(instance) = self.design().instance(id) {
                stack.extend(instance.children.iter().copied());
            }
        }
        result
    }

    /// The `count` leaf instances with the highest total power, highest
    /// first.
    pub fn highest_power_instances(
        &mut self,
        count: usize,
        corner: &Corner,
    ) -> Vec<(InstId, PowerResult)> {
        self.ensure_instance_powers(corner);
        let mut ranked: Vec<(InstId, PowerResult)> = self
            .cached_instance_powers()
            .map(|(inst, p)| (inst, *p))
            .collect();
        ranked.sort_by(|(ia, a), (ib, b)| b.total().total_cmp(&a.total()).then(ia.cmp(ib)));
        ranked.truncate(count);
        ranked
    }

    /// Count pins by activity origin and optionally list the annotated and
    /// unannotated ones.
    pub fn report_activity_annotation(
        &mut self,
        annotated: bool,
        unannotated: bool,
    ) -> ActivityAnnotationReport {
        self.ensure_activities();
        let mut report = ActivityAnnotationReport {
            counts: ActivityOrigin::ALL.iter().map(|&o| (o, 0)).collect(),
            ..Default::default()
        };
        let Some(ctx) = self.context() else {
            return report;
        };
        let design = self.design();
        for (pin, _) in design.pins() {
            let activity = ctx.pin_activity(pin);
            *report.counts.entry(activity.origin()).or_default() += 1;
            let is_annotated = ctx.store.has_user(pin);
            if annotated && is_annotated {
                report.annotated.push(design.pin_path(pin));
            }
            if unannotated && !is_annotated && design.is_driver(pin) {
                report.unannotated.push(design.pin_path(pin));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clocks::{Clock, ClockSet};
    use crate::liberty::{LibertyLibrary, LibrarySet, PortDirection};
    use crate::netlist::Design;

    const LIB: &str = r#"
library (r) {
  nom_voltage : 1.0;
  cell (BUF) {
    pin (A) { direction : input; capacitance : 0.001; }
    pin (Y) { direction : output; function : "A"; }
    leakage_power () { value : 1; }
  }
  cell (DFF) {
    ff (IQ, IQN) { next_state : "D"; clocked_on : "CK"; }
    pin (D) { direction : input; capacitance : 0.001; }
    pin (CK) { direction : input; clock : true; capacitance : 0.001; }
    pin (Q) { direction : output; function : "IQ"; }
    leakage_power () { value : 3; }
  }
  cell (RAM) {
    is_macro_cell : true;
    pin (A) { direction : input; }
    leakage_power () { value : 1000; }
  }
  cell (PAD) {
    pad_cell : true;
    pin (PAD) { direction : input; }
    leakage_power () { value : 500; }
  }
}
"#;

    /// clk -> u_clkbuf -> u_core/u_ff/CK; a -> u_core/u_ff/D; plus a RAM and
    /// a pad.
    fn design() -> Power {
        use PortDirection::{Input, Output};
        let mut d = Design::new("top");
        let top = d.top();
        let clk = d.add_port("clk", Input);
        let a = d.add_port("a", Input);
        let q = d.add_port("q", Output);
        let core = d.add_hier_instance("u_core", top);
        let buf = d.add_instance("u_clkbuf", "BUF", top);
        let ff = d.add_instance("u_ff", "DFF", core);
        let ram = d.add_instance("u_ram", "RAM", top);
        let pad = d.add_instance("u_pad", "PAD", top);
        let ba = d.add_pin(buf, "A", Input);
        let by = d.add_pin(buf, "Y", Output);
        let fd = d.add_pin(ff, "D", Input);
        let fck = d.add_pin(ff, "CK", Input);
        let fq = d.add_pin(ff, "Q", Output);
        let ra = d.add_pin(ram, "A", Input);
        let pp = d.add_pin(pad, "PAD", Input);
        for (name, pins) in [
            ("clk", vec![clk, ba]),
            ("gclk", vec![by, fck]),
            ("a", vec![a, fd, ra, pp]),
            ("q", vec![fq, q]),
        ] {
            let net = d.add_net(name);
            for p in pins {
                d.connect(p, net);
            }
        }
        let libs = LibrarySet::from(LibertyLibrary::parse(LIB).unwrap());
        let mut clocks = ClockSet::new();
        clocks.add(Clock::new("clk", 10e-9, vec![clk]));
        Power::new(d, libs, clocks)
    }

    #[test]
    fn test_categories_and_totals() {
        let mut power = design();
        let corner = Corner::default();
        let summary = power.power(&corner);

        // leakage unit defaults to 1nW
        assert!((summary.clock.leakage - 1e-9).abs() < 1e-18);
        assert!((summary.sequential.leakage - 3e-9).abs() < 1e-18);
        assert!((summary.macro_.leakage - 1e-6).abs() < 1e-18);
        assert!((summary.pad.leakage - 5e-7).abs() < 1e-18);
        assert_eq!(summary.combinational, PowerResult::default());

        let mut sum = PowerResult::default();
        for cat in [
            PowerCategory::Sequential,
            PowerCategory::Combinational,
            PowerCategory::Clock,
            PowerCategory::Macro,
            PowerCategory::Pad,
        ] {
            let p = summary.category(cat);
            assert_eq!(p.total(), p.internal + p.switching + p.leakage);
            sum.incr(p);
        }
        assert!((sum.total() - summary.total.total()).abs() < 1e-18);
        // clock buffer switches the flop clock pin
        assert!(summary.clock.switching > 0.0);
        let text = summary.to_string();
        assert!(text.contains("Sequential"));
        assert!(text.contains("Total"));
    }

    #[test]
    fn test_hierarchical_instance_power_and_ranking() {
        let mut power = design();
        let corner = Corner::default();
        let core = power.design().find_instance("u_core").unwrap();
        let ff = power.design().find_instance("u_core/u_ff").unwrap();
        let core_power = power.instance_power(core, &corner);
        let ff_power = power.instance_power(ff, &corner);
        assert_eq!(core_power, ff_power);

        let ranked = power.highest_power_instances(2, &corner);
        assert_eq!(ranked.len(), 2);
        let ram = power.design().find_instance("u_ram").unwrap();
        let pad = power.design().find_instance("u_pad").unwrap();
        assert_eq!(ranked[0].0, ram);
        assert_eq!(ranked[1].0, pad);
        assert!(ranked[0].1.total() >= ranked[1].1.total());
    }

    #[test]
    fn test_activity_annotation_report() {
        let mut power = design();
        let a = power.design().find_port("a").unwrap();
        power.set_input_port_activity(a, 1e6, 0.5).unwrap();
        let report = power.report_activity_annotation(true, true);
        assert_eq!(report.annotated, vec!["a".to_string()]);
        assert!(report.unannotated.contains(&"clk".to_string()));
        assert!(report.unannotated.contains(&"u_core/u_ff/Q".to_string()));
        assert!(report.counts[&ActivityOrigin::Input] >= 1);
        assert!(report.counts[&ActivityOrigin::Clock] >= 1);
        let total: usize = report.counts.values().sum();
        assert_eq!(total, power.design().pin_count());
        assert!(report.to_string().contains("Annotated pins:"));
    }
}
