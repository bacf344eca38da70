// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Timing graph over design pins.
//!
//! Every pin is a vertex (vertex id == pin id). Edges are net connections
//! from drivers to loads plus cell arcs derived from liberty functions and
//! sequential groups. Combinational loops are broken by marking DFS back
//! edges as disabled, and vertices are levelized by longest path so that a
//! level-ordered sweep visits every fan-in before its fan-out.

use crate::funcexpr::TimingSense;
use crate::liberty::{LibertyCell, LibrarySet, SequentialKind};
use crate::netlist::{Design, InstId, PinId};
use smallvec::SmallVec;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeRole {
    Wire,
    Combinational,
    RegClkToQ,
    LatchDToQ,
    TimingCheck,
    ClockGateEnable,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: PinId,
    pub to: PinId,
    pub role: EdgeRole,
    pub sense: TimingSense,
    /// Back edge of a combinational loop.
    pub disabled_loop: bool,
}

/// Edge filters used by graph searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPolicy {
    /// Activity propagation: stops at register outputs, clock-gate enables,
    /// timing checks and broken loops.
    Activity,
    /// Clock network discovery: wires and combinational arcs only.
    ClockTree,
}

impl SearchPolicy {
    pub fn search_thru(self, edge: &Edge) -> bool {
        if edge.disabled_loop {
            return false;
        }
        match self {
            SearchPolicy::Activity => !matches!(
                edge.role,
                EdgeRole::TimingCheck | EdgeRole::RegClkToQ | EdgeRole::ClockGateEnable
            ),
            SearchPolicy::ClockTree => {
                matches!(edge.role, EdgeRole::Wire | EdgeRole::Combinational)
            }
        }
    }
}

/// Work item for iterative DFS traversal.
/// Visit marks the vertex on-path and pushes its fan-out; Process takes it
/// off the path once the fan-out is done.
#[derive(Clone, Copy)]
enum WorkItem {
    Visit(PinId),
    Process(PinId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    OnPath,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct TimingGraph {
    edges: Vec<Edge>,
    fanout: Vec<SmallVec<[usize; 4]>>,
    fanin: Vec<SmallVec<[usize; 4]>>,
    levels: Vec<u32>,
    roots: Vec<PinId>,
    max_level: u32,
    loop_edges: usize,
}

/// Edges that order the levelization. Timing checks do not.
fn levelizes(edge: &Edge) -> bool {
    !edge.disabled_loop && edge.role != EdgeRole::TimingCheck
}

impl TimingGraph {
    pub fn build(design: &Design, libraries: &LibrarySet) -> TimingGraph {
        let n = design.pin_capacity();
        let mut graph = TimingGraph {
            fanout: vec![SmallVec::new(); n],
            fanin: vec![SmallVec::new(); n],
            levels: vec![0; n],
            ..Default::default()
        };
        graph.add_wire_edges(design);
        for inst in design.leaf_instances() {
            let cell = design
                .instance(inst)
                .and_then(|i| i.cell.as_deref())
                .and_then(|name| libraries.find_cell(name));
            if let Some((_, cell)) = cell {
                graph.add_cell_edges(design, inst, cell);
            }
        }
        graph.break_loops(design);
        graph.levelize(design);
        clilog::debug!(
            "timing graph: {} vertices, {} edges, {} loop edges disabled, {} levels",
            design.pin_count(),
            graph.edges.len(),
            graph.loop_edges,
            graph.max_level + 1
        );
        graph
    }

    fn add_edge(&mut self, from: PinId, to: PinId, role: EdgeRole, sense: TimingSense) {
        if from == to {
            return;
        }
        let id = self.edges.len();
        self.edges.push(Edge {
            from,
            to,
            role,
            sense,
            disabled_loop: false,
        });
        self.fanout[from].push(id);
        self.fanin[to].push(id);
    }

    fn add_wire_edges(&mut self, design: &Design) {
        for (pin, p) in design.pins() {
            if !design.is_driver(pin) {
                continue;
            }
            let Some(net) = p.net else { continue };
            for &load in design.net_pins(net) {
                if load != pin && design.is_load(load) {
                    self.add_edge(pin, load, EdgeRole::Wire, TimingSense::PositiveUnate);
                }
            }
        }
    }

    fn add_cell_edges(&mut self, design: &Design, inst: InstId, cell: &LibertyCell) {
        let pin_of = |port: &str| design.find_pin(inst, port);
        let Some(instance) = design.instance(inst) else {
            return;
        };

        for seq in &cell.sequentials {
            let clock_ports = seq.clock.as_ref().map(|c| c.ports()).unwrap_or_default();
            let data_ports: Vec<_> = seq
                .data
                .as_ref()
                .map(|d| d.ports())
                .unwrap_or_default()
                .into_iter()
                .filter(|p| !cell.is_internal_port(p))
                .collect();
            for &out in &instance.pins {
                let Some(out_port) = design.pin(out).map(|p| p.port.as_str()) else {
                    continue;
                };
                let reads_state = cell.pin(out_port).and_then(|p| p.function.as_ref()).is_some_and(|f| {
                    f.has_port(&seq.output)
                        || seq.output_inv.as_deref().is_some_and(|inv| f.has_port(inv))
                });
                if !reads_state {
                    continue;
                }
                for clk in clock_ports.iter().filter_map(|p| pin_of(p.as_str())) {
                    self.add_edge(clk, out, EdgeRole::RegClkToQ, TimingSense::NonUnate);
                }
                if seq.kind == SequentialKind::Latch {
                    for d in data_ports.iter().filter_map(|p| pin_of(p.as_str())) {
                        self.add_edge(d, out, EdgeRole::LatchDToQ, TimingSense::PositiveUnate);
                    }
                }
            }
            for clk in clock_ports.iter().filter_map(|p| pin_of(p.as_str())) {
                for d in data_ports.iter().filter_map(|p| pin_of(p.as_str())) {
                    self.add_edge(clk, d, EdgeRole::TimingCheck, TimingSense::Unknown);
                }
            }
        }

        let gate = cell.clock_gate_pins();
        if let Some(gate) = gate {
            if let (Some(clk), Some(en), Some(out)) =
                (pin_of(gate.clock), pin_of(gate.enable), pin_of(gate.out))
            {
                self.add_edge(clk, out, EdgeRole::Combinational, TimingSense::PositiveUnate);
                self.add_edge(en, out, EdgeRole::ClockGateEnable, TimingSense::PositiveUnate);
            }
        }

        for &out in &instance.pins {
            if !design.is_driver(out) {
                continue;
            }
            let Some(out_port) = design.pin(out).map(|p| p.port.as_str()) else {
                continue;
            };
            if gate.is_some_and(|g| g.out == out_port) {
                continue;
            }
            let Some(func) = cell.pin(out_port).and_then(|p| p.function.as_ref()) else {
                continue;
            };
            for port in func.ports() {
                if cell.is_internal_port(&port) {
                    continue;
                }
                if let Some(from) = pin_of(port.as_str()) {
                    let sense = cell.timing_sense(&port, out_port);
                    self.add_edge(from, out, EdgeRole::Combinational, sense);
                }
            }
        }
    }

    /// Mark one edge of every cycle as a disabled loop edge.
    fn break_loops(&mut self, design: &Design) {
        let mut marks = vec![Mark::New; self.fanout.len()];
        let mut stack = Vec::new();
        for (start, _) in design.pins() {
            if marks[start] != Mark::New {
                continue;
            }
            stack.push(WorkItem::Visit(start));
            while let Some(item) = stack.pop() {
                match item {
                    WorkItem::Visit(v) => {
                        if marks[v] != Mark::New {
                            continue;
                        }
                        marks[v] = Mark::OnPath;
                        stack.push(WorkItem::Process(v));
                        for &e in &self.fanout[v] {
                            let edge = &mut self.edges[e];
                            if !levelizes(edge) {
                                continue;
                            }
                            match marks[edge.to] {
                                Mark::New => stack.push(WorkItem::Visit(edge.to)),
                                Mark::OnPath => {
                                    edge.disabled_loop = true;
                                    self.loop_edges += 1;
                                    clilog::debug!(
                                        "disabling loop edge {} -> {}",
                                        design.pin_path(edge.from),
                                        design.pin_path(edge.to)
                                    );
                                }
                                Mark::Done => {}
                            }
                        }
                    }
                    WorkItem::Process(v) => {
                        marks[v] = Mark::Done;
                    }
                }
            }
        }
        if self.loop_edges > 0 {
            clilog::info!("broke {} combinational loop edges", self.loop_edges);
        }
    }

    /// Longest-path levels over the levelizing edges (Kahn's algorithm).
    fn levelize(&mut self, design: &Design) {
        let mut indegree = vec![0usize; self.fanin.len()];
        for edge in self.edges.iter().filter(|e| levelizes(e)) {
            indegree[edge.to] += 1;
        }
        let mut ready: Vec<PinId> = design
            .pins()
            .map(|(pin, _)| pin)
            .filter(|&pin| indegree[pin] == 0)
            .collect();
        self.roots = ready
            .iter()
            .copied()
            .filter(|&pin| !design.is_internal(pin))
            .collect();
        ready.reverse();
        while let Some(v) = ready.pop() {
            for &e in &self.fanout[v] {
                let edge = &self.edges[e];
                if !levelizes(edge) {
                    continue;
                }
                let to = edge.to;
                self.levels[to] = self.levels[to].max(self.levels[v] + 1);
                self.max_level = self.max_level.max(self.levels[to]);
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    ready.push(to);
                }
            }
        }
    }

    pub fn edge(&self, id: usize) -> &Edge {
        &self.edges[id]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn out_edges(&self, pin: PinId) -> impl Iterator<Item = &Edge> + '_ {
        self.fanout
            .get(pin)
            .into_iter()
            .flatten()
            .map(move |&e| &self.edges[e])
    }

    pub fn in_edges(&self, pin: PinId) -> impl Iterator<Item = &Edge> + '_ {
        self.fanin
            .get(pin)
            .into_iter()
            .flatten()
            .map(move |&e| &self.edges[e])
    }

    /// Driver of a load pin through its first usable wire edge.
    pub fn wire_driver(&self, pin: PinId) -> Option<PinId> {
        self.in_edges(pin)
            .find(|e| e.role == EdgeRole::Wire && !e.disabled_loop)
            .map(|e| e.from)
    }

    pub fn level(&self, pin: PinId) -> u32 {
        self.levels.get(pin).copied().unwrap_or(0)
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Vertices without levelizing fan-in, internal pins excluded.
    pub fn roots(&self) -> &[PinId] {
        &self.roots
    }

    pub fn loop_edge_count(&self) -> usize {
        self.loop_edges
    }

    pub fn vertex_count(&self) -> usize {
        self.fanout.len()
    }
}

/// Vertex queue drained in ascending level order. A vertex is queued at
/// most once until it is popped.
#[derive(Debug, Clone, Default)]
pub struct LevelQueue {
    buckets: BTreeMap<u32, Vec<PinId>>,
    queued: Vec<bool>,
}

impl LevelQueue {
    pub fn new(vertex_count: usize) -> Self {
        LevelQueue {
            buckets: BTreeMap::new(),
            queued: vec![false; vertex_count],
        }
    }

    pub fn enqueue(&mut self, graph: &TimingGraph, pin: PinId) {
        match self.queued.get_mut(pin) {
            Some(q) if !*q => *q = true,
            _ => return,
        }
        self.buckets.entry(graph.level(pin)).or_default().push(pin);
    }

    /// Remove and return the lowest-level bucket.
    pub fn pop_level(&mut self) -> Option<(u32, Vec<PinId>)> {
        let (level, pins) = self.buckets.pop_first()?;
        for &pin in &pins {
            self.queued[pin] = false;
        }
        Some((level, pins))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liberty::{LibertyLibrary, PortDirection};

    const LIB: &str = r#"
library (g) {
  cell (INV) {
    pin (A) { direction : input; }
    pin (Y) { direction : output; function : "!A"; }
  }
  cell (NAND2) {
    pin (A) { direction : input; }
    pin (B) { direction : input; }
    pin (Y) { direction : output; function : "!(A & B)"; }
  }
  cell (DFF) {
    ff (IQ, IQN) { next_state : "D"; clocked_on : "CLK"; }
    pin (CLK) { direction : input; clock : true; }
    pin (D) { direction : input; }
    pin (Q) { direction : output; function : "IQ"; }
  }
}
"#;

    fn cell(design: &mut Design, name: &str, cell: &str, ports: &[(&str, PortDirection, &str)]) -> Vec<PinId> {
        let top = design.top();
        let inst = design.add_instance(name, cell, top);
        ports
            .iter()
            .map(|&(port, dir, net)| {
                let pin = design.add_pin(inst, port, dir);
                let net = design.add_net(net);
                design.connect(pin, net);
                pin
            })
            .collect()
    }

    fn port(design: &mut Design, name: &str, dir: PortDirection) -> PinId {
        let pin = design.add_port(name, dir);
        let net = design.add_net(name);
        design.connect(pin, net);
        pin
    }

    #[test]
    fn test_levels_and_roles() {
        let libs = LibrarySet::from(LibertyLibrary::parse(LIB).unwrap());
        let mut d = Design::new("t");
        use PortDirection::*;
        let a = port(&mut d, "a", Input);
        let clk = port(&mut d, "clk", Input);
        let inv = cell(&mut d, "u0", "INV", &[("A", Input, "a"), ("Y", Output, "n1")]);
        let ff = cell(
            &mut d,
            "r0",
            "DFF",
            &[("D", Input, "n1"), ("CLK", Input, "clk"), ("Q", Output, "q")],
        );
        let graph = TimingGraph::build(&d, &libs);

        assert_eq!(graph.level(a), 0);
        assert_eq!(graph.level(inv[0]), 1);
        assert_eq!(graph.level(inv[1]), 2);
        assert_eq!(graph.level(ff[0]), 3);
        assert_eq!(graph.wire_driver(ff[0]), Some(inv[1]));
        assert!(graph.roots().contains(&a));
        assert!(graph.roots().contains(&clk));
        assert!(!graph.roots().contains(&ff[2]));

        let clk_to_q = graph.in_edges(ff[2]).next().unwrap();
        assert_eq!(clk_to_q.role, EdgeRole::RegClkToQ);
        assert!(!SearchPolicy::Activity.search_thru(clk_to_q));
        assert!(!SearchPolicy::ClockTree.search_thru(clk_to_q));

        let check = graph.out_edges(ff[1]).find(|e| e.role == EdgeRole::TimingCheck).unwrap();
        assert_eq!(check.to, ff[0]);
        assert!(!SearchPolicy::Activity.search_thru(check));

        let arc = graph.in_edges(inv[1]).next().unwrap();
        assert_eq!(arc.role, EdgeRole::Combinational);
        assert_eq!(arc.sense, TimingSense::NegativeUnate);
        assert!(SearchPolicy::Activity.search_thru(arc));
        assert!(SearchPolicy::ClockTree.search_thru(arc));
    }

    #[test]
    fn test_loop_is_broken() {
        // cross-coupled NAND latch
        let libs = LibrarySet::from(LibertyLibrary::parse(LIB).unwrap());
        let mut d = Design::new("t");
        use PortDirection::*;
        port(&mut d, "s", Input);
        port(&mut d, "r", Input);
        cell(&mut d, "n0", "NAND2", &[("A", Input, "s"), ("B", Input, "qb"), ("Y", Output, "q")]);
        cell(&mut d, "n1", "NAND2", &[("A", Input, "r"), ("B", Input, "q"), ("Y", Output, "qb")]);
        let graph = TimingGraph::build(&d, &libs);
        assert_eq!(graph.loop_edge_count(), 1);
        let disabled: Vec<_> = graph.edges().iter().filter(|e| e.disabled_loop).collect();
        assert_eq!(disabled.len(), 1);
        assert!(!SearchPolicy::Activity.search_thru(disabled[0]));
        // every enabled edge goes strictly up in level
        for e in graph.edges().iter().filter(|e| levelizes(e)) {
            assert!(graph.level(e.to) > graph.level(e.from));
        }
    }

    #[test]
    fn test_level_queue_order() {
        let libs = LibrarySet::from(LibertyLibrary::parse(LIB).unwrap());
        let mut d = Design::new("t");
        use PortDirection::*;
        let a = port(&mut d, "a", Input);
        let inv = cell(&mut d, "u0", "INV", &[("A", Input, "a"), ("Y", Output, "y")]);
        let graph = TimingGraph::build(&d, &libs);

        let mut queue = LevelQueue::new(graph.vertex_count());
        queue.enqueue(&graph, inv[1]);
        queue.enqueue(&graph, a);
        queue.enqueue(&graph, a);
        let (level, pins) = queue.pop_level().unwrap();
        assert_eq!((level, pins), (0, vec![a]));
        queue.enqueue(&graph, a);
        assert_eq!(queue.pop_level().unwrap().1, vec![a]);
        assert_eq!(queue.pop_level().unwrap().1, vec![inv[1]]);
        assert!(queue.is_empty());
    }
}
