// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Activity annotation from value change dumps.
//!
//! Every bit under the chosen scope gets a toggle density (0/1 transitions
//! per second of dumped time) and a duty (time at 1 over dumped time).
//! Transitions to or from x/z are not counted as toggles.

use crate::activity::{ActivityOrigin, ActivityRecord};
use crate::error::{Error, Result};
use crate::netlist::PinId;
use crate::power::Power;
use compact_str::{format_compact, CompactString};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use vcd_ng::{FFValueChange, FastFlow, FastFlowToken, Parser, Scope, ScopeItem, Var};

/// Seconds per tick when the dump has no `$timescale`.
const DEFAULT_TICK: f64 = 1e-12;

/// Per-bit activities of one dump, keyed by `/`-separated path relative
/// to the chosen scope (`sub/net[3]`).
#[derive(Debug, Clone, Default)]
pub struct VcdActivities {
    /// Seconds per VCD tick.
    pub tick: f64,
    pub start: u64,
    pub end: u64,
    pub signals: IndexMap<CompactString, ActivityRecord>,
}

impl VcdActivities {
    /// Dumped time in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start) as f64 * self.tick
    }

    pub fn get(&self, name: &str) -> Option<&ActivityRecord> {
        self.signals.get(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BitState {
    value: Option<bool>,
    since: u64,
    high: u64,
    toggles: u64,
}

impl BitState {
    fn change(&mut self, value: Option<bool>, now: u64) {
        if value == self.value {
            return;
        }
        if self.value == Some(true) {
            self.high += now - self.since;
        }
        if self.value.is_some() && value.is_some() {
            self.toggles += 1;
        }
        self.value = value;
        self.since = now;
    }
}

fn bit_value(b: u8) -> Option<bool> {
    match b {
        b'1' => Some(true),
        b'0' => Some(false),
        _ => None,
    }
}

/// Match one component of a `/`-separated scope path. Returns the rest.
fn match_scope_path<'i>(scope: &'i str, cur: &str) -> Option<&'i str> {
    let scope = scope.strip_prefix('/').unwrap_or(scope);
    if scope.is_empty() {
        return Some("");
    }
    let rest = scope.strip_prefix(cur)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

fn find_scope<'i>(items: &'i [ScopeItem], path: &str) -> Option<&'i Scope> {
    for item in items {
        if let ScopeItem::Scope(scope) = item {
            if let Some(rest) = match_scope_path(path, scope.identifier.as_str()) {
                return match rest {
                    "" => Some(scope),
                    _ => find_scope(&scope.children[..], rest),
                };
            }
        }
    }
    None
}

/// Bit indices of a variable, most significant (first in the value string)
/// first. `None` for a scalar.
fn var_bits(var: &Var) -> Vec<Option<i64>> {
    use vcd_ng::ReferenceIndex::*;
    match var.index {
        None if var.size == 1 => vec![None],
        None => (0..var.size as i64).rev().map(Some).collect(),
        Some(BitSelect(i)) => vec![Some(i as i64)],
        Some(Range(a, b)) => {
            let (a, b) = (a as i64, b as i64);
            if a >= b {
                (b..=a).rev().map(Some).collect()
            } else {
                (a..=b).map(Some).collect()
            }
        }
    }
}

/// Tracked bits: name aliases per bit, and (code, position) to bit.
#[derive(Default)]
struct BitMap {
    names: Vec<Vec<CompactString>>,
    by_code: HashMap<(u64, usize), usize>,
    widths: HashMap<u64, usize>,
}

impl BitMap {
    fn collect(&mut self, items: &[ScopeItem], prefix: &str) {
        for item in items {
            match item {
                ScopeItem::Var(var) => {
                    let bits = var_bits(var);
                    self.widths.insert(var.code.0, bits.len());
                    for (pos, index) in bits.into_iter().enumerate() {
                        let name = match index {
                            Some(i) => format_compact!("{}{}[{}]", prefix, var.reference, i),
                            None => format_compact!("{}{}", prefix, var.reference),
                        };
                        let next = self.names.len();
                        let idx = *self.by_code.entry((var.code.0, pos)).or_insert(next);
                        if idx == next {
                            self.names.push(Vec::new());
                        }
                        self.names[idx].push(name);
                    }
                }
                ScopeItem::Scope(scope) => {
                    let child = format!("{}{}/", prefix, scope.identifier);
                    self.collect(&scope.children[..], &child);
                }
                _ => {}
            }
        }
    }
}

/// Read toggle counts and time at 1 for every bit below `scope`. Without a
/// scope the first top-level scope is used.
pub fn read_vcd_activities(path: impl AsRef<Path>, scope: Option<&str>) -> Result<VcdActivities> {
    let path = path.as_ref();
    let vcd_err = |e: std::io::Error| Error::Vcd(format!("{}: {}", path.display(), e));
    let timer = clilog::stimer!("read vcd activities");

    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut bufrd = BufReader::with_capacity(65536, file);
    let mut parser = Parser::new(&mut bufrd);
    let header = parser.parse_header().map_err(vcd_err)?;
    drop(parser);
    let mut file = bufrd.into_inner();
    file.seek(SeekFrom::Start(0)).map_err(|e| Error::io(path, e))?;
    let mut flow = FastFlow::new(file, 65536);

    let tick = match header.timescale {
        Some((ratio, unit)) => ratio as f64 / unit.divisor() as f64,
        None => DEFAULT_TICK,
    };
    let top = find_scope(&header.items[..], scope.unwrap_or(""))
        .ok_or_else(|| Error::Vcd(format!("scope {:?} not found", scope.unwrap_or(""))))?;

    let mut bitmap = BitMap::default();
    bitmap.collect(&top.children[..], "");
    clilog::debug!("tracking {} VCD bits under scope {}", bitmap.names.len(), top.identifier);

    let mut states = vec![BitState::default(); bitmap.names.len()];
    let mut start: Option<u64> = None;
    let mut now = 0u64;
    while let Some(tok) = flow.next_token().map_err(vcd_err)? {
        match tok {
            FastFlowToken::Timestamp(t) => {
                if start.is_none() {
                    start = Some(t);
                    // values dumped before the first timestamp start here
                    for s in states.iter_mut() {
                        s.since = t;
                    }
                }
                now = t;
            }
            FastFlowToken::Value(FFValueChange { id, bits }) => {
                let Some(&width) = bitmap.widths.get(&id.0) else {
                    continue;
                };
                // left-extend short vector values
                let pad = width.saturating_sub(bits.len());
                let fill = match bits.first() {
                    Some(b'1') | None => b'0',
                    Some(&b) => b,
                };
                for pos in 0..width {
                    let b = if pos < pad { fill } else { bits[pos - pad] };
                    if let Some(&idx) = bitmap.by_code.get(&(id.0, pos)) {
                        states[idx].change(bit_value(b), now);
                    }
                }
            }
        }
    }

    let start = start.unwrap_or(0);
    let end = now;
    if end <= start {
        return Err(Error::Vcd(format!("{}: dump covers no time", path.display())));
    }
    let ticks = (end - start) as f64;
    let seconds = ticks * tick;
    let mut signals = IndexMap::new();
    for (state, names) in states.iter_mut().zip(&bitmap.names) {
        state.change(None, end);
        let activity = ActivityRecord::new(
            state.toggles as f64 / seconds,
            state.high as f64 / ticks,
            ActivityOrigin::Vcd,
        );
        for name in names {
            signals.insert(name.clone(), activity);
        }
    }
    clilog::finish!(timer);
    Ok(VcdActivities {
        tick,
        start,
        end,
        signals,
    })
}

impl Power {
    /// Pins a VCD signal name stands for: a top port or cell pin by path,
    /// else the drivers of the net with that name.
    fn vcd_signal_pins(&self, name: &str) -> Vec<PinId> {
        let design = self.design();
        if let Some(pin) = design.find_pin_by_path(name) {
            return vec![pin];
        }
        let Some(net) = design.find_net(name) else {
            return Vec::new();
        };
        design
            .net_pins(net)
            .iter()
            .copied()
            .filter(|&p| design.is_driver(p))
            .collect()
    }

    /// Pin the activities found in a VCD file as user annotations with
    /// origin `Vcd`. Returns the number of pins annotated.
    pub fn annotate_vcd(&mut self, path: impl AsRef<Path>, scope: Option<&str>) -> Result<usize> {
        let vcd = read_vcd_activities(path, scope)?;
        let mut annotated = 0;
        let mut unmatched = 0;
        for (name, activity) in &vcd.signals {
            let pins = self.vcd_signal_pins(name);
            if pins.is_empty() {
                unmatched += 1;
                clilog::trace!("VCD signal {} matches no pin", name);
                continue;
            }
            for pin in pins {
                self.set_user_activity(pin, activity.density(), activity.duty(), ActivityOrigin::Vcd)?;
                annotated += 1;
            }
        }
        clilog::info!(
            "annotated {} pins from {:.3e}s of VCD ({} signals unmatched)",
            annotated,
            vcd.duration(),
            unmatched
        );
        Ok(annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DUMP: &str = r#"$timescale 1ns $end
$scope module top $end
$var wire 1 ! a $end
$var wire 2 " bus [1:0] $end
$scope module u_sub $end
$var wire 1 # n $end
$upscope $end
$upscope $end
$enddefinitions $end
#0
0!
b00 "
x#
#10
1!
b01 "
0#
#20
0!
1#
#30
1!
b11 "
#40
"#;

    fn write_dump() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DUMP.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_density_and_duty() {
        let file = write_dump();
        let vcd = read_vcd_activities(file.path(), None).unwrap();
        assert!((vcd.tick - 1e-9).abs() < 1e-21);
        assert!((vcd.duration() - 40e-9).abs() < 1e-18);

        let a = vcd.get("a").unwrap();
        // 3 toggles in 40ns, high 20ns of 40ns
        assert!((a.density() - 7.5e7).abs() < 1.0);
        assert!((a.duty() - 0.5).abs() < 1e-12);
        assert_eq!(a.origin(), ActivityOrigin::Vcd);

        let b0 = vcd.get("bus[0]").unwrap();
        assert!((b0.density() - 2.5e7).abs() < 1.0);
        assert!((b0.duty() - 0.75).abs() < 1e-12);
        let b1 = vcd.get("bus[1]").unwrap();
        assert!((b1.duty() - 0.25).abs() < 1e-12);

        // x to 0 is not a toggle
        let n = vcd.get("u_sub/n").unwrap();
        assert!((n.density() - 2.5e7).abs() < 1.0);
        assert!((n.duty() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_missing_scope() {
        let file = write_dump();
        assert!(matches!(
            read_vcd_activities(file.path(), Some("nope")),
            Err(Error::Vcd(_))
        ));
        let sub = read_vcd_activities(file.path(), Some("top/u_sub")).unwrap();
        assert!(sub.get("n").is_some());
        assert!(sub.get("a").is_none());
    }

    #[test]
    fn test_scope_path_matching() {
        assert_eq!(match_scope_path("top/u_sub", "top"), Some("u_sub"));
        assert_eq!(match_scope_path("/top", "top"), Some(""));
        assert_eq!(match_scope_path("topx", "top"), None);
        assert_eq!(match_scope_path("", "anything"), Some(""));
    }
}
