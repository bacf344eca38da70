// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! File fixtures shared by the integration tests: a small library, an
//! AND gate feeding a register, and a configuration tying them together.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const LIB: &str = r#"
library (demo) {
  time_unit : "1ns";
  capacitive_load_unit (1, pf);
  voltage_unit : "1V";
  leakage_power_unit : "1nW";
  nom_voltage : 1.0;
  operating_conditions (slow) { voltage : 0.5; }
  cell (AND2) {
    cell_leakage_power : 1;
    pin (A) { direction : input; capacitance : 0.002; }
    pin (B) { direction : input; capacitance : 0.002; }
    pin (Y) {
      direction : output;
      function : "A & B";
      internal_power () {
        related_pin : "A";
        rise_power (scalar) { values ("0.004"); }
        fall_power (scalar) { values ("0.002"); }
      }
      internal_power () {
        related_pin : "B";
        rise_power (scalar) { values ("0.004"); }
        fall_power (scalar) { values ("0.002"); }
      }
    }
  }
  cell (DFF) {
    cell_leakage_power : 3;
    ff (IQ, IQN) { next_state : "D"; clocked_on : "CK"; }
    pin (D) { direction : input; capacitance : 0.002; }
    pin (CK) {
      direction : input;
      clock : true;
      capacitance : 0.001;
      internal_power () {
        rise_power (scalar) { values ("0.001"); }
        fall_power (scalar) { values ("0.001"); }
      }
    }
    pin (Q) { direction : output; function : "IQ"; }
  }
}
"#;

/// a, b -> u_and -> n -> u_ff/D; clk -> u_ff/CK; u_ff/Q -> q
pub const NETLIST: &str = r#"{
  "modules": {
    "top": {
      "attributes": { "top": "00000000000000000000000000000001" },
      "ports": {
        "a": { "direction": "input", "bits": [2] },
        "b": { "direction": "input", "bits": [3] },
        "clk": { "direction": "input", "bits": [4] },
        "q": { "direction": "output", "bits": [6] }
      },
      "cells": {
        "u_and": {
          "type": "AND2",
          "port_directions": { "A": "input", "B": "input", "Y": "output" },
          "connections": { "A": [2], "B": [3], "Y": [5] }
        },
        "u_ff": {
          "type": "DFF",
          "port_directions": { "D": "input", "CK": "input", "Q": "output" },
          "connections": { "D": [5], "CK": [4], "Q": [6] }
        }
      },
      "netnames": {
        "a": { "bits": [2] },
        "b": { "bits": [3] },
        "clk": { "bits": [4] },
        "n": { "bits": [5] },
        "q": { "bits": [6] }
      }
    }
  }
}"#;

/// a toggles every 10ns for 40ns, b holds 1.
pub const VCD: &str = r#"$timescale 1ns $end
$scope module tb $end
$scope module top $end
$var wire 1 ! a $end
$var wire 1 " b $end
$upscope $end
$upscope $end
$enddefinitions $end
#0
0!
1"
#10
1!
#20
0!
#30
1!
#40
0!
"#;

pub const CONFIG: &str = r#"{
  "liberty": ["demo.lib"],
  "netlist": "top.json",
  "clocks": [{ "name": "clk", "period": 1e-8, "sources": ["clk"] }],
  "input_activity": { "density": 1e8, "duty": 0.5 }
}"#;

/// Write the library, netlist, dump and a configuration into `dir`, with
/// `extra` JSON fields merged into the configuration. Returns the
/// configuration path.
pub fn write_fixture(dir: &Path, extra: serde_json::Value) -> PathBuf {
    std::fs::write(dir.join("demo.lib"), LIB).unwrap();
    std::fs::write(dir.join("top.json"), NETLIST).unwrap();
    std::fs::write(dir.join("dump.vcd"), VCD).unwrap();
    let mut config: serde_json::Value = serde_json::from_str(CONFIG).unwrap();
    if let serde_json::Value::Object(fields) = extra {
        for (k, v) in fields {
            config[k] = v;
        }
    }
    let path = dir.join("power.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1e-30)
}
