// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Power estimation tool for Loom.
//!
//! Propagates switching activity through a gate-level netlist and reports
//! internal, switching and leakage power by category.
//!
//! Usage:
//!   cargo run -r --bin loom-power -- --config power.json [options]
//!   cargo run -r --bin loom-power -- --liberty cells.lib --netlist top.json \
//!       --clock clk --clock-period 10

use loom_power::config::{ActivityConfig, ClockConfig, PowerConfig};
use loom_power::{Corner, Power, PowerSummary};
use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
#[command(name = "loom-power")]
#[command(about = "Activity propagation and power estimation for gate-level netlists")]
struct Args {
    /// JSON configuration. Flags below override its fields.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Liberty library file (repeatable).
    #[clap(long)]
    liberty: Vec<PathBuf>,

    /// Yosys JSON netlist.
    #[clap(long)]
    netlist: Option<PathBuf>,

    /// Top module type in netlist to analyze.
    /// If not specified, uses the module marked as top.
    #[clap(long)]
    top_module: Option<String>,

    /// Port the clock is defined on.
    #[clap(long)]
    clock: Option<String>,

    /// Clock period in nanoseconds (default: 10).
    #[clap(long, default_value = "10")]
    clock_period: f64,

    /// Activity annotation from a VCD dump.
    #[clap(long)]
    vcd: Option<PathBuf>,

    /// Scope of the design inside the VCD, `/`-separated.
    #[clap(long)]
    vcd_scope: Option<String>,

    /// Toggle density of unannotated inputs, in transitions per second.
    #[clap(long)]
    input_density: Option<f64>,

    /// Duty of unannotated inputs.
    #[clap(long, default_value = "0.5")]
    input_duty: f64,

    /// Cap on register fixpoint passes.
    #[clap(long)]
    max_passes: Option<usize>,

    /// Operating conditions to evaluate supply voltages at.
    #[clap(long)]
    operating_conditions: Option<String>,

    /// Number of highest-power instances to report (default: 10).
    #[clap(long, default_value = "10")]
    num_instances: usize,

    /// Report activity annotation coverage.
    #[clap(long)]
    report_annotation: bool,

    /// List pins without an activity annotation.
    #[clap(long)]
    list_unannotated: bool,

    /// Output format: text, json.
    #[clap(long, default_value = "text")]
    format: String,
}

impl Args {
    fn into_config(self) -> loom_power::Result<PowerConfig> {
        let mut config = match &self.config {
            Some(path) => PowerConfig::from_file(path)?,
            None => PowerConfig::default(),
        };
        if !self.liberty.is_empty() {
            config.liberty = self.liberty;
        }
        if self.netlist.is_some() {
            config.netlist = self.netlist;
        }
        if self.top_module.is_some() {
            config.top = self.top_module;
        }
        if let Some(clock) = self.clock {
            config.clocks = vec![ClockConfig {
                name: clock.clone(),
                period: self.clock_period * 1e-9,
                waveform: None,
                sources: vec![clock],
                master: None,
            }];
        }
        if self.vcd.is_some() {
            config.vcd = self.vcd;
            config.vcd_scope = self.vcd_scope;
        }
        if let Some(density) = self.input_density {
            config.input_activity = Some(ActivityConfig {
                density,
                duty: self.input_duty,
            });
        }
        if let Some(max_passes) = self.max_passes {
            config.propagation.max_passes = max_passes;
        }
        if self.operating_conditions.is_some() {
            config.operating_conditions = self.operating_conditions;
        }
        Ok(config)
    }
}

fn main() {
    clilog::init_stderr_color_debug();

    let args = <Args as clap::Parser>::parse();
    clilog::info!("Power analysis args:\n{:#?}", args);

    let num_instances = args.num_instances;
    let report_annotation = args.report_annotation;
    let list_unannotated = args.list_unannotated;
    let json = args.format == "json";

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            clilog::error!("{}", e);
            std::process::exit(2);
        }
    };
    let mut power = match config.build_power() {
        Ok(power) => power,
        Err(e) => {
            clilog::error!("{}", e);
            std::process::exit(1);
        }
    };
    let corner = config.corner();

    let timer = clilog::stimer!("power analysis");
    let summary = power.power(&corner);
    clilog::finish!(timer);

    if let Some(stats) = power.propagation_stats() {
        clilog::info!(
            "activity propagation: {} passes, converged: {}",
            stats.passes,
            stats.converged
        );
    }

    if json {
        print_json_report(&mut power, &summary, &corner, num_instances, report_annotation, list_unannotated);
    } else {
        print_text_report(&mut power, &summary, &corner, num_instances, report_annotation, list_unannotated);
    }
}

fn print_text_report(
    power: &mut Power,
    summary: &PowerSummary,
    corner: &Corner,
    num_instances: usize,
    report_annotation: bool,
    list_unannotated: bool,
) {
    println!();
    println!("Corner: {}", corner.name);
    println!("{}", summary);

    println!("=== Highest Power Instances (Top {}) ===", num_instances);
    for (i, (inst, p)) in power
        .highest_power_instances(num_instances, corner)
        .into_iter()
        .enumerate()
    {
        let cell = power
            .design()
            .instance(inst)
            .and_then(|x| x.cell.clone())
            .unwrap_or_default();
        println!(
            "#{}: {} ({}) total={:.4e} W internal={:.4e} switching={:.4e} leakage={:.4e}",
            i + 1,
            power.design().instance_path(inst),
            cell,
            p.total(),
            p.internal,
            p.switching,
            p.leakage
        );
    }
    println!();

    if report_annotation || list_unannotated {
        println!("{}", power.report_activity_annotation(false, list_unannotated));
    }
}

fn print_json_report(
    power: &mut Power,
    summary: &PowerSummary,
    corner: &Corner,
    num_instances: usize,
    report_annotation: bool,
    list_unannotated: bool,
) {
    let instances: Vec<serde_json::Value> = power
        .highest_power_instances(num_instances, corner)
        .into_iter()
        .map(|(inst, p)| {
            serde_json::json!({
                "instance": power.design().instance_path(inst),
                "category": power.classify(inst),
                "power": p,
                "total": p.total(),
            })
        })
        .collect();

    let mut json = serde_json::json!({
        "corner": corner,
        "summary": summary,
        "total": summary.total.total(),
        "highest_power_instances": instances,
    });
    if report_annotation || list_unannotated {
        json["activity_annotation"] =
            serde_json::json!(power.report_activity_annotation(false, list_unannotated));
    }
    if let Some(stats) = power.propagation_stats() {
        json["propagation"] = serde_json::json!({
            "passes": stats.passes,
            "converged": stats.converged,
        });
    }

    match serde_json::to_string_pretty(&json) {
        Ok(text) => println!("{}", text),
        Err(e) => clilog::error!("cannot serialize report: {}", e),
    }
}
