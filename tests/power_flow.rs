// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! End-to-end runs from a configuration file: load, propagate, estimate.

mod common;

use common::{close, write_fixture};
use loom_power::config::PowerConfig;
use loom_power::{ActivityOrigin, Corner, Power, PowerCategory};
use serde_json::json;

fn load(extra: serde_json::Value) -> (tempfile::TempDir, PowerConfig, Power) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), extra);
    let config = PowerConfig::from_file(&path).unwrap();
    let power = config.build_power().unwrap();
    (dir, config, power)
}

fn activity(power: &mut Power, path: &str) -> loom_power::ActivityRecord {
    let pin = power.design().find_pin_by_path(path).unwrap();
    power.pin_activity(pin)
}

#[test]
fn and_gate_into_register() {
    let (_dir, config, mut power) = load(json!({}));
    let y = activity(&mut power, "u_and/Y");
    assert!(close(y.duty(), 0.25));
    // 1e8 * 0.5 + 1e8 * 0.5
    assert!(close(y.density(), 1e8));
    assert_eq!(y.origin(), ActivityOrigin::Propagated);

    let ck = activity(&mut power, "u_ff/CK");
    assert!(close(ck.density(), 2e8));

    let corner = config.corner();
    let and = power.design().find_instance("u_and").unwrap();
    let p = power.instance_power(and, &corner);
    // DFF/D 2fF at 1V
    assert!(close(p.switching, 0.5 * 2e-15 * 1e8));
    assert!(close(p.leakage, 1e-9));
    assert_eq!(power.classify(and), PowerCategory::Combinational);
    let ff = power.design().find_instance("u_ff").unwrap();
    assert_eq!(power.classify(ff), PowerCategory::Sequential);
}

#[test]
fn activities_stay_in_range() {
    let (_dir, _config, mut power) = load(json!({}));
    let pins: Vec<_> = power.design().pins().map(|(p, _)| p).collect();
    for pin in pins {
        let a = power.pin_activity(pin);
        assert!(a.density() >= 0.0);
        assert!((0.0..=1.0).contains(&a.duty()));
    }
    let stats = power.propagation_stats().unwrap();
    assert!(stats.converged);
}

#[test]
fn totals_add_up() {
    let (_dir, config, mut power) = load(json!({}));
    let corner = config.corner();
    let summary = power.power(&corner);
    let buckets = [
        PowerCategory::Sequential,
        PowerCategory::Combinational,
        PowerCategory::Clock,
        PowerCategory::Macro,
        PowerCategory::Pad,
    ];
    let sum: f64 = buckets.iter().map(|&c| summary.category(c).total()).sum();
    assert!(close(summary.total.total(), sum));
    let t = summary.total;
    assert!(close(t.total(), t.internal + t.switching + t.leakage));
    assert!(summary.sequential.total() > 0.0);
    assert!(summary.combinational.total() > 0.0);

    let ranked = power.highest_power_instances(5, &corner);
    assert_eq!(ranked.len(), 2);
    assert!(ranked[0].1.total() >= ranked[1].1.total());
}

#[test]
fn global_activity_overrides_everything() {
    let (_dir, _config, mut power) =
        load(json!({ "global_activity": { "density": 3e7, "duty": 0.2 } }));
    let pins: Vec<_> = power.design().pins().map(|(p, _)| p).collect();
    for pin in pins {
        let a = power.pin_activity(pin);
        assert_eq!(a.density(), 3e7);
        assert_eq!(a.duty(), 0.2);
        assert_eq!(a.origin(), ActivityOrigin::Global);
    }
}

#[test]
fn vcd_annotation_drives_propagation() {
    let (_dir, _config, mut power) = load(json!({ "vcd": "dump.vcd", "vcd_scope": "tb/top" }));
    let a = activity(&mut power, "a");
    assert_eq!(a.origin(), ActivityOrigin::Vcd);
    // 4 toggles in 40ns, high half the time
    assert!(close(a.density(), 1e8));
    assert!(close(a.duty(), 0.5));
    let b = activity(&mut power, "b");
    assert_eq!(b.density(), 0.0);
    assert_eq!(b.duty(), 1.0);

    let y = activity(&mut power, "u_and/Y");
    assert!(close(y.duty(), 0.5));
    assert!(close(y.density(), 1e8));

    let report = power.report_activity_annotation(true, true);
    assert_eq!(report.counts[&ActivityOrigin::Vcd], 2);
    assert_eq!(report.annotated, vec!["a".to_string(), "b".to_string()]);
    assert!(!report.unannotated.iter().any(|p| p == "a"));
}

#[test]
fn user_annotation_and_corner() {
    let (_dir, _config, mut power) = load(json!({
        "activities": { "u_and/Y": { "density": 4e7, "duty": 0.1 } },
        "operating_conditions": "slow"
    }));
    let y = activity(&mut power, "u_and/Y");
    assert_eq!(y.origin(), ActivityOrigin::User);
    assert_eq!(y.density(), 4e7);
    let d = activity(&mut power, "u_ff/D");
    assert_eq!(d.density(), 4e7);

    let slow = Corner::new("slow").with_operating_conditions("slow");
    let and = power.design().find_instance("u_and").unwrap();
    let p = power.instance_power(and, &slow);
    // 0.5V supply
    assert!(close(p.switching, 0.5 * 2e-15 * 0.25 * 4e7));
    let nominal = power.instance_power(and, &Corner::default());
    assert!(close(nominal.switching, 4.0 * p.switching));
}

#[test]
fn rerun_is_bitwise_identical() {
    let (_dir, config, mut power) = load(json!({}));
    let corner = config.corner();
    let first = power.power(&corner);
    power.invalidate();
    let second = power.power(&corner);
    assert_eq!(first, second);
}

#[test]
fn deletion_recomputes() {
    let (_dir, config, mut power) = load(json!({}));
    let corner = config.corner();
    let before = power.power(&corner);
    let ff = power.design().find_instance("u_ff").unwrap();
    assert!(power.delete_instance(ff));
    let after = power.power(&corner);
    assert_eq!(after.sequential.total(), 0.0);
    assert!(after.total.total() < before.total.total());
    let ranked = power.highest_power_instances(5, &corner);
    assert_eq!(ranked.len(), 1);
}

#[test]
fn bad_configuration_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), json!({ "activities": { "nope/A": { "density": 1, "duty": 0.5 } } }));
    let config = PowerConfig::from_file(&path).unwrap();
    assert!(matches!(config.build_power(), Err(loom_power::Error::Config(_))));

    let path = write_fixture(dir.path(), json!({ "input_activity": { "density": -1, "duty": 0.5 } }));
    let config = PowerConfig::from_file(&path).unwrap();
    assert!(matches!(
        config.build_power(),
        Err(loom_power::Error::InvalidActivity { .. })
    ));
}
