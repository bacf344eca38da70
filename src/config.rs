// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! JSON run configuration.
//!
//! A configuration names the libraries and netlist, the clocks, and the
//! activity annotations to apply before estimation:
//!
//! ```json
//! {
//!   "liberty": ["cells.lib"],
//!   "netlist": "design.json",
//!   "top": "chip",
//!   "clocks": [{ "name": "clk", "period": 1e-8, "sources": ["clk"] }],
//!   "input_activity": { "density": 1e7, "duty": 0.5 },
//!   "activities": { "u_core/en": { "density": 0.0, "duty": 1.0 } },
//!   "constants": { "test_mode": false },
//!   "propagation": { "max_passes": 50 }
//! }
//! ```

use crate::activity::ActivityOrigin;
use crate::clocks::{Clock, ClockSet};
use crate::error::{Error, Result};
use crate::liberty::{LibertyLibrary, LibrarySet};
use crate::netlist::{Design, PinId};
use crate::power::{Corner, Power};
use crate::propagate::PropagationConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Liberty files, searched in order for each cell.
    pub liberty: Vec<PathBuf>,
    /// Yosys JSON netlist.
    pub netlist: Option<PathBuf>,
    /// Top module. Defaults to the module Yosys marked as top.
    pub top: Option<String>,
    pub clocks: Vec<ClockConfig>,
    /// Activity of top-level inputs without an annotation.
    pub input_activity: Option<ActivityConfig>,
    /// Activity forced on every pin.
    pub global_activity: Option<ActivityConfig>,
    /// Per-pin annotations keyed by `inst/path/port` or top port name.
    pub activities: IndexMap<String, ActivityConfig>,
    /// Case values keyed by net name.
    pub constants: IndexMap<String, bool>,
    pub vcd: Option<PathBuf>,
    pub vcd_scope: Option<String>,
    pub propagation: PropagationConfig,
    pub corner: Option<String>,
    pub operating_conditions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    pub name: String,
    /// Seconds.
    pub period: f64,
    /// Rise and fall times within the period. Defaults to 50% duty.
    #[serde(default)]
    pub waveform: Option<[f64; 2]>,
    /// Pins or ports the clock is defined on.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Master clock of a generated clock.
    #[serde(default)]
    pub master: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Transitions per second.
    pub density: f64,
    pub duty: f64,
}

impl PowerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config = Self::parse(&content)?;
        // relative paths are resolved against the configuration file
        if let Some(dir) = path.parent() {
            config.rebase(dir);
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    fn rebase(&mut self, dir: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        self.liberty
            .iter_mut()
            .chain(self.netlist.as_mut())
            .chain(self.vcd.as_mut())
            .for_each(rebase);
    }

    pub fn corner(&self) -> Corner {
        let corner = Corner::new(self.corner.as_deref().unwrap_or("default"));
        match &self.operating_conditions {
            Some(oc) => corner.with_operating_conditions(oc),
            None => corner,
        }
    }

    pub fn load_libraries(&self) -> Result<LibrarySet> {
        if self.liberty.is_empty() {
            return Err(Error::Config("no liberty files given".to_string()));
        }
        let mut libs = LibrarySet::new();
        for path in &self.liberty {
            libs.add(LibertyLibrary::from_file(path)?);
        }
        Ok(libs)
    }

    pub fn load_design(&self, libraries: &LibrarySet) -> Result<Design> {
        let netlist = self
            .netlist
            .as_ref()
            .ok_or_else(|| Error::Config("no netlist given".to_string()))?;
        let mut design = Design::from_yosys_json(netlist, self.top.as_deref(), libraries)?;
        for (name, &value) in &self.constants {
            let net = design
                .find_net(name)
                .ok_or_else(|| Error::Config(format!("constant on unknown net {}", name)))?;
            design.set_net_constant(net, Some(value));
        }
        Ok(design)
    }

    fn resolve_pin(design: &Design, path: &str) -> Result<PinId> {
        design
            .find_pin_by_path(path)
            .ok_or_else(|| Error::Config(format!("pin {} not found", path)))
    }

    /// Clocks in declaration order. A master must be declared before the
    /// clocks generated from it.
    pub fn build_clocks(&self, design: &Design) -> Result<ClockSet> {
        let mut clocks = ClockSet::new();
        for c in &self.clocks {
            if !(c.period.is_finite() && c.period > 0.0) {
                return Err(Error::Config(format!(
                    "clock {} has invalid period {}",
                    c.name, c.period
                )));
            }
            let sources = c
                .sources
                .iter()
                .map(|s| Self::resolve_pin(design, s))
                .collect::<Result<Vec<_>>>()?;
            let mut clock = Clock::new(&c.name, c.period, sources);
            if let Some([rise, fall]) = c.waveform {
                clock = clock.with_waveform(rise, fall);
            }
            if let Some(master) = &c.master {
                let id = clocks.find(master);
                if id.is_none() {
                    clilog::warn!("master clock {} of {} is not defined", master, c.name);
                }
                clock = clock.generated_from(id);
            }
            clocks.add(clock);
        }
        Ok(clocks)
    }

    /// Apply the activity settings of this configuration to an engine.
    pub fn apply_activities(&self, power: &mut Power) -> Result<()> {
        if let Some(a) = self.input_activity {
            power.set_input_activity(a.density, a.duty)?;
        }
        if let Some(a) = self.global_activity {
            power.set_global_activity(a.density, a.duty)?;
        }
        if let Some(vcd) = &self.vcd {
            power.annotate_vcd(vcd, self.vcd_scope.as_deref())?;
        }
        for (path, a) in &self.activities {
            let pin = Self::resolve_pin(power.design(), path)?;
            power.set_user_activity(pin, a.density, a.duty, ActivityOrigin::User)?;
        }
        Ok(())
    }

    /// Load everything and return a ready engine.
    pub fn build_power(&self) -> Result<Power> {
        let libraries = self.load_libraries()?;
        let design = self.load_design(&libraries)?;
        let clocks = self.build_clocks(&design)?;
        let mut power = Power::new(design, libraries, clocks).with_config(self.propagation);
        self.apply_activities(&mut power)?;
        Ok(power)
    }
}
