// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Clock definitions and clock network membership.

use crate::activity::{ActivityOrigin, ActivityRecord};
use crate::graph::{SearchPolicy, TimingGraph};
use crate::netlist::PinId;
use compact_str::CompactString;
use std::collections::VecDeque;

pub type ClockId = usize;

/// Generated-clock master chains longer than this are treated as cycles.
const MAX_MASTER_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct Clock {
    pub name: CompactString,
    /// Seconds.
    pub period: f64,
    /// Rising and falling edge times within the period, in seconds.
    pub waveform: (f64, f64),
    pub sources: Vec<PinId>,
    pub generated: bool,
    pub master: Option<ClockId>,
}

impl Clock {
    /// A clock with a 50% waveform.
    pub fn new(name: &str, period: f64, sources: Vec<PinId>) -> Self {
        Clock {
            name: name.into(),
            period,
            waveform: (0.0, period / 2.0),
            sources,
            generated: false,
            master: None,
        }
    }

    pub fn with_waveform(mut self, rise: f64, fall: f64) -> Self {
        self.waveform = (rise, fall);
        self
    }

    /// Mark as a generated clock derived from `master` (if known).
    pub fn generated_from(mut self, master: Option<ClockId>) -> Self {
        self.generated = true;
        self.master = master;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClockSet {
    clocks: Vec<Clock>,
}

impl ClockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, clock: Clock) -> ClockId {
        self.clocks.push(clock);
        self.clocks.len() - 1
    }

    pub fn get(&self, id: ClockId) -> Option<&Clock> {
        self.clocks.get(id)
    }

    pub fn find(&self, name: &str) -> Option<ClockId> {
        self.clocks.iter().position(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClockId, &Clock)> + '_ {
        self.clocks.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Fastest positive clock period.
    pub fn min_period(&self) -> Option<f64> {
        self.clocks
            .iter()
            .map(|c| c.period)
            .filter(|&p| p > 0.0)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Fraction of the period the clock is high. Generated clocks use
    /// their master's duty, or 0.5 without a master.
    pub fn duty(&self, id: ClockId) -> f64 {
        let mut id = id;
        for _ in 0..MAX_MASTER_DEPTH {
            let Some(clock) = self.clocks.get(id) else {
                return 0.5;
            };
            if clock.generated {
                match clock.master {
                    Some(master) => {
                        id = master;
                        continue;
                    }
                    None => return 0.5,
                }
            }
            if clock.period <= 0.0 {
                return 0.5;
            }
            let (rise, fall) = clock.waveform;
            let mut high = fall - rise;
            if high < 0.0 {
                high += clock.period;
            }
            return (high / clock.period).clamp(0.0, 1.0);
        }
        clilog::warn!("generated clock master chain does not end; using duty 0.5");
        0.5
    }

    /// Two transitions per period at the clock duty.
    pub fn activity(&self, id: ClockId) -> ActivityRecord {
        match self.clocks.get(id) {
            Some(clock) if clock.period > 0.0 => {
                ActivityRecord::new(2.0 / clock.period, self.duty(id), ActivityOrigin::Clock)
            }
            _ => ActivityRecord::unknown(),
        }
    }

    /// Fastest clock defined on a source pin.
    pub fn clock_for_source(&self, pin: PinId) -> Option<ClockId> {
        self.iter()
            .filter(|(_, c)| c.sources.contains(&pin))
            .min_by(|(_, a), (_, b)| a.period.total_cmp(&b.period))
            .map(|(id, _)| id)
    }

    pub fn remove_source_pin(&mut self, pin: PinId) {
        for clock in &mut self.clocks {
            clock.sources.retain(|&p| p != pin);
        }
    }
}

/// Pins reached by each clock through wires and combinational arcs.
/// A pin reached by several clocks belongs to the fastest one.
#[derive(Debug, Clone, Default)]
pub struct ClockNetwork {
    pin_clock: Vec<Option<ClockId>>,
}

impl ClockNetwork {
    pub fn build(graph: &TimingGraph, clocks: &ClockSet) -> Self {
        let mut pin_clock = vec![None; graph.vertex_count()];
        let mut order: Vec<ClockId> = clocks.iter().map(|(id, _)| id).collect();
        order.sort_by(|&a, &b| {
            let pa = clocks.get(a).map(|c| c.period).unwrap_or(f64::INFINITY);
            let pb = clocks.get(b).map(|c| c.period).unwrap_or(f64::INFINITY);
            pa.total_cmp(&pb)
        });

        let mut queue = VecDeque::new();
        for id in order {
            let Some(clock) = clocks.get(id) else { continue };
            for &src in &clock.sources {
                if pin_clock.get(src) == Some(&None) {
                    pin_clock[src] = Some(id);
                    queue.push_back(src);
                }
            }
            while let Some(pin) = queue.pop_front() {
                for edge in graph.out_edges(pin) {
                    if !SearchPolicy::ClockTree.search_thru(edge) {
                        continue;
                    }
                    if pin_clock.get(edge.to) == Some(&None) {
                        pin_clock[edge.to] = Some(id);
                        queue.push_back(edge.to);
                    }
                }
            }
        }
        ClockNetwork { pin_clock }
    }

    pub fn clock_of(&self, pin: PinId) -> Option<ClockId> {
        self.pin_clock.get(pin).copied().flatten()
    }

    pub fn is_clock(&self, pin: PinId) -> bool {
        self.clock_of(pin).is_some()
    }

    pub fn pin_count(&self) -> usize {
        self.pin_clock.iter().filter(|c| c.is_some()).count()
    }
}
