// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Gate-level design database.
//!
//! Instances, pins and nets live in arenas indexed by plain `usize` ids;
//! deleted entries become tombstones so ids stay stable. Hierarchical
//! instances only group their children: connectivity is flat, each net
//! joining leaf-cell pins and top-level ports directly.
//!
//! Designs are either built programmatically or loaded from a Yosys JSON
//! netlist, whose hierarchy is flattened while loading.

use crate::error::{Error, Result};
use crate::liberty::{LibrarySet, PortDirection};
use compact_str::{format_compact, CompactString};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::path::Path;

pub type InstId = usize;
pub type PinId = usize;
pub type NetId = usize;

#[derive(Debug, Clone)]
pub struct Instance {
    pub name: CompactString,
    /// Liberty cell name for leaf instances, `None` for hierarchy.
    pub cell: Option<CompactString>,
    pub parent: Option<InstId>,
    pub children: Vec<InstId>,
    pub pins: SmallVec<[PinId; 4]>,
}

impl Instance {
    pub fn is_leaf(&self) -> bool {
        self.cell.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Pin {
    pub port: CompactString,
    pub instance: InstId,
    pub direction: PortDirection,
    pub net: Option<NetId>,
}

#[derive(Debug, Clone)]
pub struct Net {
    pub name: CompactString,
    pub pins: SmallVec<[PinId; 4]>,
    /// Tie value or case analysis constant.
    pub constant: Option<bool>,
    /// Wire capacitance in farads.
    pub wire_cap: f64,
}

#[derive(Debug, Clone)]
pub struct Design {
    pub name: CompactString,
    instances: Vec<Option<Instance>>,
    pins: Vec<Option<Pin>>,
    nets: Vec<Option<Net>>,
    net_names: IndexMap<CompactString, NetId>,
    port_loads: IndexMap<PinId, f64>,
    slews: IndexMap<PinId, [f64; 2]>,
    const_nets: [Option<NetId>; 2],
}

const TOP: InstId = 0;

impl Design {
    pub fn new(name: &str) -> Self {
        Design {
            name: name.into(),
            instances: vec![Some(Instance {
                name: name.into(),
                cell: None,
                parent: None,
                children: Vec::new(),
                pins: SmallVec::new(),
            })],
            pins: Vec::new(),
            nets: Vec::new(),
            net_names: IndexMap::new(),
            port_loads: IndexMap::new(),
            slews: IndexMap::new(),
            const_nets: [None, None],
        }
    }

    pub fn top(&self) -> InstId {
        TOP
    }

    fn push_instance(&mut self, name: &str, cell: Option<&str>, parent: InstId) -> InstId {
        let id = self.instances.len();
        self.instances.push(Some(Instance {
            name: name.into(),
            cell: cell.map(Into::into),
            parent: Some(parent),
            children: Vec::new(),
            pins: SmallVec::new(),
        }));
        if let Some(Some(p)) = self.instances.get_mut(parent) {
            p.children.push(id);
        }
        id
    }

    /// Add a leaf instance of a liberty cell.
    pub fn add_instance(&mut self, name: &str, cell: &str, parent: InstId) -> InstId {
        self.push_instance(name, Some(cell), parent)
    }

    /// Add a hierarchical (grouping) instance.
    pub fn add_hier_instance(&mut self, name: &str, parent: InstId) -> InstId {
        self.push_instance(name, None, parent)
    }

    pub fn add_pin(&mut self, inst: InstId, port: &str, direction: PortDirection) -> PinId {
        let id = self.pins.len();
        self.pins.push(Some(Pin {
            port: port.into(),
            instance: inst,
            direction,
            net: None,
        }));
        if let Some(Some(i)) = self.instances.get_mut(inst) {
            i.pins.push(id);
        }
        id
    }

    /// Add a top-level port.
    pub fn add_port(&mut self, name: &str, direction: PortDirection) -> PinId {
        self.add_pin(TOP, name, direction)
    }

    /// Add a net, or return the existing net of that name.
    pub fn add_net(&mut self, name: &str) -> NetId {
        if let Some(&id) = self.net_names.get(name) {
            return id;
        }
        let id = self.nets.len();
        self.nets.push(Some(Net {
            name: name.into(),
            pins: SmallVec::new(),
            constant: None,
            wire_cap: 0.0,
        }));
        self.net_names.insert(name.into(), id);
        id
    }

    /// Shared tie net for a logic constant.
    pub fn constant_net(&mut self, value: bool) -> NetId {
        if let Some(id) = self.const_nets[value as usize] {
            return id;
        }
        let id = self.add_net(if value { "1'b1" } else { "1'b0" });
        self.set_net_constant(id, Some(value));
        self.const_nets[value as usize] = Some(id);
        id
    }

    pub fn connect(&mut self, pin: PinId, net: NetId) {
        self.disconnect(pin);
        if let Some(Some(n)) = self.nets.get_mut(net) {
            n.pins.push(pin);
            if let Some(Some(p)) = self.pins.get_mut(pin) {
                p.net = Some(net);
            }
        }
    }

    pub fn disconnect(&mut self, pin: PinId) {
        let Some(Some(p)) = self.pins.get_mut(pin) else {
            return;
        };
        if let Some(net) = p.net.take() {
            if let Some(Some(n)) = self.nets.get_mut(net) {
                n.pins.retain(|&mut q| q != pin);
            }
        }
    }

    pub fn set_net_constant(&mut self, net: NetId, value: Option<bool>) {
        if let Some(Some(n)) = self.nets.get_mut(net) {
            n.constant = value;
        }
    }

    pub fn set_net_wire_cap(&mut self, net: NetId, cap: f64) {
        if let Some(Some(n)) = self.nets.get_mut(net) {
            n.wire_cap = cap;
        }
    }

    /// External load on a top-level port, in farads.
    pub fn set_port_load(&mut self, pin: PinId, cap: f64) {
        self.port_loads.insert(pin, cap);
    }

    /// Annotated rise/fall transition time of a pin, in seconds.
    pub fn set_pin_slew(&mut self, pin: PinId, rise: f64, fall: f64) {
        self.slews.insert(pin, [rise, fall]);
    }

    pub fn instance(&self, id: InstId) -> Option<&Instance> {
        self.instances.get(id).and_then(|i| i.as_ref())
    }

    pub fn pin(&self, id: PinId) -> Option<&Pin> {
        self.pins.get(id).and_then(|p| p.as_ref())
    }

    pub fn net(&self, id: NetId) -> Option<&Net> {
        self.nets.get(id).and_then(|n| n.as_ref())
    }

    /// Size of the pin id space, tombstones included.
    pub fn pin_capacity(&self) -> usize {
        self.pins.len()
    }

    pub fn pins(&self) -> impl Iterator<Item = (PinId, &Pin)> + '_ {
        self.pins
            .iter()
            .enumerate()
            .filter_map(|(id, p)| p.as_ref().map(|p| (id, p)))
    }

    pub fn pin_count(&self) -> usize {
        self.pins.iter().filter(|p| p.is_some()).count()
    }

    pub fn instances(&self) -> impl Iterator<Item = (InstId, &Instance)> + '_ {
        self.instances
            .iter()
            .enumerate()
            .filter_map(|(id, i)| i.as_ref().map(|i| (id, i)))
    }

    pub fn leaf_instances(&self) -> impl Iterator<Item = InstId> + '_ {
        self.instances()
            .filter(|(_, i)| i.is_leaf())
            .map(|(id, _)| id)
    }

    pub fn find_pin(&self, inst: InstId, port: &str) -> Option<PinId> {
        self.instance(inst)?
            .pins
            .iter()
            .copied()
            .find(|&p| self.pin(p).is_some_and(|p| p.port == port))
    }

    pub fn find_port(&self, name: &str) -> Option<PinId> {
        self.find_pin(TOP, name)
    }

    pub fn find_child(&self, parent: InstId, name: &str) -> Option<InstId> {
        self.instance(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.instance(c).is_some_and(|c| c.name == name))
    }

    /// Look up an instance by `/`-separated hierarchical path.
    pub fn find_instance(&self, path: &str) -> Option<InstId> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(TOP, |inst, name| self.find_child(inst, name))
    }

    /// Look up `inst/path/port`, or a top-level port without a `/`.
    pub fn find_pin_by_path(&self, path: &str) -> Option<PinId> {
        match path.rsplit_once('/') {
            Some((inst, port)) => self.find_pin(self.find_instance(inst)?, port),
            None => self.find_port(path),
        }
    }

    pub fn find_net(&self, name: &str) -> Option<NetId> {
        self.net_names
            .get(name)
            .copied()
            .filter(|&n| self.net(n).is_some())
    }

    pub fn is_top_level(&self, pin: PinId) -> bool {
        self.pin(pin).is_some_and(|p| p.instance == TOP)
    }

    /// Drivers are leaf outputs and top-level inputs.
    pub fn is_driver(&self, pin: PinId) -> bool {
        match self.pin(pin) {
            Some(p) if p.instance == TOP => p.direction.is_input(),
            Some(p) => p.direction.is_output(),
            None => false,
        }
    }

    /// Loads are leaf inputs and top-level outputs.
    pub fn is_load(&self, pin: PinId) -> bool {
        match self.pin(pin) {
            Some(p) if p.instance == TOP => p.direction.is_output(),
            Some(p) => p.direction.is_input(),
            None => false,
        }
    }

    pub fn is_internal(&self, pin: PinId) -> bool {
        self.pin(pin)
            .is_some_and(|p| p.direction == PortDirection::Internal)
    }

    pub fn net_pins(&self, net: NetId) -> &[PinId] {
        self.net(net).map(|n| n.pins.as_slice()).unwrap_or(&[])
    }

    pub fn pin_net(&self, pin: PinId) -> Option<NetId> {
        self.pin(pin).and_then(|p| p.net)
    }

    pub fn pin_constant(&self, pin: PinId) -> Option<bool> {
        self.pin_net(pin)
            .and_then(|n| self.net(n))
            .and_then(|n| n.constant)
    }

    pub fn pin_slew(&self, pin: PinId) -> Option<[f64; 2]> {
        self.slews.get(&pin).copied()
    }

    /// Smaller of the annotated rise and fall transitions.
    pub fn min_slew(&self, pin: PinId) -> Option<f64> {
        self.pin_slew(pin).map(|[r, f]| r.min(f))
    }

    pub fn port_load(&self, pin: PinId) -> f64 {
        self.port_loads.get(&pin).copied().unwrap_or(0.0)
    }

    pub fn instance_path(&self, inst: InstId) -> String {
        let mut names = Vec::new();
        let mut cur = Some(inst);
        while let Some(id) = cur.filter(|&id| id != TOP) {
            match self.instance(id) {
                Some(i) => {
                    names.push(i.name.as_str());
                    cur = i.parent;
                }
                None => break,
            }
        }
        names.reverse();
        names.join("/")
    }

    pub fn pin_path(&self, pin: PinId) -> String {
        match self.pin(pin) {
            Some(p) if p.instance == TOP => p.port.to_string(),
            Some(p) => format!("{}/{}", self.instance_path(p.instance), p.port),
            None => format!("<deleted pin {}>", pin),
        }
    }

    /// Remove an instance, its pins and its whole subtree.
    pub fn delete_instance(&mut self, inst: InstId) -> bool {
        if inst == TOP {
            return false;
        }
        let Some(instance) = self.instances.get_mut(inst).and_then(|i| i.take()) else {
            return false;
        };
        for child in instance.children {
            self.delete_instance(child);
        }
        for pin in instance.pins {
            self.remove_pin_entry(pin);
        }
        if let Some(Some(parent)) = instance.parent.and_then(|p| self.instances.get_mut(p)) {
            parent.children.retain(|&c| c != inst);
        }
        true
    }

    pub fn delete_pin(&mut self, pin: PinId) -> bool {
        let Some(inst) = self.pin(pin).map(|p| p.instance) else {
            return false;
        };
        self.remove_pin_entry(pin);
        if let Some(Some(i)) = self.instances.get_mut(inst) {
            i.pins.retain(|&mut p| p != pin);
        }
        true
    }

    fn remove_pin_entry(&mut self, pin: PinId) {
        self.disconnect(pin);
        if let Some(p) = self.pins.get_mut(pin) {
            *p = None;
        }
        self.slews.shift_remove(&pin);
        self.port_loads.shift_remove(&pin);
    }

    /// Load a Yosys JSON netlist (`write_json`), flattening the hierarchy
    /// below `top`. Without `top` the module marked `top` is used.
    pub fn from_yosys_json(
        path: impl AsRef<Path>,
        top: Option<&str>,
        libraries: &LibrarySet,
    ) -> Result<Design> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let design = Self::from_yosys_str(&content, top, libraries)?;
        clilog::info!(
            "read netlist {} from {}: {} instances, {} pins",
            design.name,
            path.display(),
            design.leaf_instances().count(),
            design.pin_count()
        );
        Ok(design)
    }

    pub fn from_yosys_str(
        content: &str,
        top: Option<&str>,
        libraries: &LibrarySet,
    ) -> Result<Design> {
        let json: Value = serde_json::from_str(content)?;
        let modules = json
            .get("modules")
            .and_then(|m| m.as_object())
            .ok_or_else(|| Error::Netlist("no modules in JSON".to_string()))?;

        let top_name = match top {
            Some(t) => t.to_string(),
            None => find_top_module(modules)?,
        };
        let module = modules
            .get(&top_name)
            .ok_or_else(|| Error::Netlist(format!("top module {} not found", top_name)))?;

        let mut loader = YosysLoader {
            modules,
            libraries,
            design: Design::new(&top_name),
        };
        let mut bits = IndexMap::new();
        loader.name_nets(module, "", &mut bits);
        if let Some(ports) = module.get("ports").and_then(|p| p.as_object()) {
            for (name, port) in ports {
                let direction = port
                    .get("direction")
                    .and_then(|d| d.as_str())
                    .map(PortDirection::from_liberty)
                    .unwrap_or_default();
                let port_bits = json_array(port, "bits");
                for (i, bit) in port_bits.iter().enumerate() {
                    let pin_name = bit_name(name, i, port_bits.len());
                    let pin = loader.design.add_port(&pin_name, direction);
                    if let Some(net) = loader.bit_net(bit, &mut bits, "") {
                        loader.design.connect(pin, net);
                    }
                }
            }
        }
        loader.instantiate(module, TOP, &mut bits, "", 0)?;
        Ok(loader.design)
    }
}

fn find_top_module(modules: &Map<String, Value>) -> Result<String> {
    let marked = modules.iter().find(|(_, m)| {
        match m.get("attributes").and_then(|a| a.get("top")) {
            Some(Value::String(s)) => s.trim_start_matches('0') == "1",
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            _ => false,
        }
    });
    match marked {
        Some((name, _)) => Ok(name.clone()),
        None if modules.len() == 1 => Ok(modules.keys().next().cloned().unwrap_or_default()),
        None => Err(Error::Netlist(
            "no module carries the top attribute; name one explicitly".to_string(),
        )),
    }
}

fn json_array<'v>(value: &'v Value, key: &str) -> &'v [Value] {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

fn bit_name(name: &str, index: usize, width: usize) -> CompactString {
    if width == 1 {
        name.into()
    } else {
        format_compact!("{}[{}]", name, index)
    }
}

/// Hierarchy deeper than this is taken to be recursive instantiation.
const MAX_HIERARCHY_DEPTH: usize = 256;

struct YosysLoader<'a> {
    modules: &'a Map<String, Value>,
    libraries: &'a LibrarySet,
    design: Design,
}

impl<'a> YosysLoader<'a> {
    /// Create named nets for every bit of `module` not bound yet.
    /// Visible names win over `hide_name` ones.
    fn name_nets(&mut self, module: &Value, prefix: &str, bits: &mut IndexMap<u64, NetId>) {
        let Some(netnames) = module.get("netnames").and_then(|n| n.as_object()) else {
            return;
        };
        for hidden_pass in [false, true] {
            for (name, netname) in netnames {
                let hidden = netname.get("hide_name").and_then(|h| h.as_u64()) == Some(1);
                if hidden != hidden_pass {
                    continue;
                }
                let net_bits = json_array(netname, "bits");
                for (i, bit) in net_bits.iter().enumerate() {
                    if let Some(id) = bit.as_u64() {
                        if !bits.contains_key(&id) {
                            let full = format!("{}{}", prefix, bit_name(name, i, net_bits.len()));
                            let net = self.design.add_net(&full);
                            bits.insert(id, net);
                        }
                    }
                }
            }
        }
    }

    fn bit_net(&mut self, bit: &Value, bits: &mut IndexMap<u64, NetId>, prefix: &str) -> Option<NetId> {
        match bit {
            Value::Number(n) => {
                let id = n.as_u64()?;
                if let Some(&net) = bits.get(&id) {
                    return Some(net);
                }
                let net = self.design.add_net(&format!("{}n{}", prefix, id));
                bits.insert(id, net);
                Some(net)
            }
            Value::String(s) if s == "0" => Some(self.design.constant_net(false)),
            Value::String(s) if s == "1" => Some(self.design.constant_net(true)),
            _ => None,
        }
    }

    fn instantiate(
        &mut self,
        module: &Value,
        parent: InstId,
        bits: &mut IndexMap<u64, NetId>,
        prefix: &str,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_HIERARCHY_DEPTH {
            return Err(Error::Netlist(format!(
                "hierarchy under {} is deeper than {} levels",
                prefix, MAX_HIERARCHY_DEPTH
            )));
        }
        let Some(cells) = module.get("cells").and_then(|c| c.as_object()) else {
            return Ok(());
        };
        let modules = self.modules;
        let libraries = self.libraries;
        for (cell_name, cell) in cells {
            let cell_type = cell.get("type").and_then(|t| t.as_str()).unwrap_or("");
            let connections = cell.get("connections").and_then(|c| c.as_object());

            if let Some(sub) = modules.get(cell_type) {
                let child = self.design.add_hier_instance(cell_name, parent);
                let child_prefix = format!("{}{}/", prefix, cell_name);
                let mut sub_bits = IndexMap::new();
                if let (Some(ports), Some(connections)) =
                    (sub.get("ports").and_then(|p| p.as_object()), connections)
                {
                    for (port_name, port) in ports {
                        let outer = connections
                            .get(port_name)
                            .and_then(|c| c.as_array())
                            .map(|c| c.as_slice())
                            .unwrap_or(&[]);
                        for (inner, outer) in json_array(port, "bits").iter().zip(outer) {
                            let Some(inner) = inner.as_u64() else { continue };
                            if let Some(net) = self.bit_net(outer, bits, prefix) {
                                sub_bits.insert(inner, net);
                            }
                        }
                    }
                }
                self.name_nets(sub, &child_prefix, &mut sub_bits);
                self.instantiate(sub, child, &mut sub_bits, &child_prefix, depth + 1)?;
                continue;
            }

            let inst = self.design.add_instance(cell_name, cell_type, parent);
            let lib_cell = libraries.find_cell(cell_type).map(|(_, c)| c);
            if lib_cell.is_none() {
                clilog::warn!("cell type {} of {}{} is not in any library", cell_type, prefix, cell_name);
            }
            let Some(connections) = connections else { continue };
            for (port, conn) in connections {
                let conn = conn.as_array().map(|c| c.as_slice()).unwrap_or(&[]);
                let yosys_direction = cell
                    .get("port_directions")
                    .and_then(|d| d.get(port))
                    .and_then(|d| d.as_str())
                    .map(PortDirection::from_liberty);
                for (i, bit) in conn.iter().enumerate() {
                    let pin_name = bit_name(port, i, conn.len());
                    let direction = lib_cell
                        .and_then(|c| c.pin(&pin_name).or_else(|| c.pin(port)))
                        .map(|p| p.direction)
                        .or(yosys_direction)
                        .unwrap_or(PortDirection::Input);
                    let pin = self.design.add_pin(inst, &pin_name, direction);
                    if let Some(net) = self.bit_net(bit, bits, prefix) {
                        self.design.connect(pin, net);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIER_JSON: &str = r#"{
      "modules": {
        "half": {
          "ports": {
            "a": { "direction": "input", "bits": [2] },
            "y": { "direction": "output", "bits": [3] }
          },
          "cells": {
            "inv": {
              "type": "INV",
              "port_directions": { "A": "input", "Y": "output" },
              "connections": { "A": [2], "Y": [3] }
            }
          },
          "netnames": { "a": { "bits": [2] }, "y": { "bits": [3] } }
        },
        "top": {
          "attributes": { "top": "00000000000000000000000000000001" },
          "ports": {
            "in": { "direction": "input", "bits": [2, 3] },
            "out": { "direction": "output", "bits": [4] }
          },
          "cells": {
            "u_and": {
              "type": "AND2",
              "port_directions": { "A": "input", "B": "input", "Y": "output" },
              "connections": { "A": [2], "B": [3], "Y": [5] }
            },
            "u_half": {
              "type": "half",
              "connections": { "a": [5], "y": [4] }
            },
            "u_tie": {
              "type": "AND2",
              "port_directions": { "A": "input", "B": "input", "Y": "output" },
              "connections": { "A": ["1"], "B": [3], "Y": ["x"] }
            }
          },
          "netnames": {
            "in": { "bits": [2, 3] },
            "mid": { "bits": [5] },
            "out": { "bits": [4] }
          }
        }
      }
    }"#;

    #[test]
    fn test_yosys_flatten() {
        let design = Design::from_yosys_str(HIER_JSON, None, &LibrarySet::new()).unwrap();
        assert_eq!(design.name, "top");
        assert_eq!(design.leaf_instances().count(), 3);

        let inv = design.find_instance("u_half/inv").expect("flattened instance");
        assert_eq!(design.instance_path(inv), "u_half/inv");
        let inv_a = design.find_pin_by_path("u_half/inv/A").unwrap();
        let and_y = design.find_pin_by_path("u_and/Y").unwrap();
        assert_eq!(design.pin_net(inv_a), design.pin_net(and_y));
        assert_eq!(design.net(design.pin_net(and_y).unwrap()).unwrap().name, "mid");

        let out = design.find_port("out").unwrap();
        let inv_y = design.find_pin_by_path("u_half/inv/Y").unwrap();
        assert_eq!(design.pin_net(out), design.pin_net(inv_y));

        let in0 = design.find_port("in[0]").unwrap();
        assert!(design.is_driver(in0));
        assert!(!design.is_load(in0));
        assert!(design.is_load(out));
        assert!(design.is_driver(and_y));
        assert!(design.is_load(inv_a));

        let tie_a = design.find_pin_by_path("u_tie/A").unwrap();
        assert_eq!(design.pin_constant(tie_a), Some(true));
        let tie_y = design.find_pin_by_path("u_tie/Y").unwrap();
        assert_eq!(design.pin_net(tie_y), None);
    }

    #[test]
    fn test_missing_top() {
        let json = r#"{"modules": {"a": {}, "b": {}}}"#;
        assert!(matches!(
            Design::from_yosys_str(json, None, &LibrarySet::new()),
            Err(Error::Netlist(_))
        ));
        assert!(Design::from_yosys_str(json, Some("a"), &LibrarySet::new()).is_ok());
        assert!(Design::from_yosys_str("{", None, &LibrarySet::new()).is_err());
    }

    #[test]
    fn test_delete_instance_and_pin() {
        let mut design = Design::new("t");
        let a = design.add_port("a", PortDirection::Input);
        let n = design.add_net("n");
        design.connect(a, n);
        let blk = design.add_hier_instance("blk", design.top());
        let u1 = design.add_instance("u1", "BUF", blk);
        let u1_a = design.add_pin(u1, "A", PortDirection::Input);
        design.connect(u1_a, n);
        design.set_pin_slew(u1_a, 1e-10, 2e-10);
        assert_eq!(design.net_pins(n).len(), 2);
        assert_eq!(design.min_slew(u1_a), Some(1e-10));

        assert!(design.delete_instance(blk));
        assert!(design.instance(u1).is_none());
        assert!(design.pin(u1_a).is_none());
        assert_eq!(design.net_pins(n), &[a]);
        assert_eq!(design.pin_slew(u1_a), None);
        assert!(design.find_instance("blk").is_none());
        assert!(!design.delete_instance(design.top()));

        assert!(design.delete_pin(a));
        assert!(design.net_pins(n).is_empty());
        assert_eq!(design.find_port("a"), None);
        assert_eq!(design.pin_count(), 0);
    }

    #[test]
    fn test_net_names_are_unique() {
        let mut design = Design::new("t");
        let n1 = design.add_net("x");
        let n2 = design.add_net("x");
        assert_eq!(n1, n2);
        let c0 = design.constant_net(false);
        assert_eq!(design.constant_net(false), c0);
        assert_eq!(design.net(c0).unwrap().constant, Some(false));
    }
}
