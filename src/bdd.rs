// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Probabilistic evaluation of cell functions over BDDs.
//!
//! Each function is compiled into a BDD over its own ports, so the
//! variable manager lives only as long as one evaluation. Duty is the
//! probability the function is true when every input is independently
//! high with its duty; density sums the input densities weighted by the
//! probability that the input is observable at the output (the Boolean
//! difference).

use crate::activity::{ActivityOrigin, ActivityRecord};
use crate::funcexpr::FuncExpr;
use biodivine_lib_bdd::{Bdd, BddPointer, BddVariable, BddVariableSet};
use compact_str::CompactString;
use std::collections::HashMap;

/// A function compiled to a BDD, one variable per referenced port.
pub struct FuncBdd {
    vars: BddVariableSet,
    ports: Vec<CompactString>,
    bdd: Bdd,
}

impl FuncBdd {
    pub fn build(expr: &FuncExpr) -> FuncBdd {
        let ports = expr.ports();
        let vars = BddVariableSet::new_anonymous(ports.len() as u16);
        let var_list = vars.variables();
        let bdd = Self::compile(expr, &vars, &ports, &var_list);
        FuncBdd { vars, ports, bdd }
    }

    fn compile(
        expr: &FuncExpr,
        vars: &BddVariableSet,
        ports: &[CompactString],
        var_list: &[BddVariable],
    ) -> Bdd {
        match expr {
            FuncExpr::Zero => vars.mk_false(),
            FuncExpr::One => vars.mk_true(),
            FuncExpr::Port(name) => match ports.iter().position(|p| p == name) {
                Some(i) => vars.mk_var(var_list[i]),
                None => vars.mk_false(),
            },
            FuncExpr::Not(e) => Self::compile(e, vars, ports, var_list).not(),
            FuncExpr::And(a, b) => Self::compile(a, vars, ports, var_list)
                .and(&Self::compile(b, vars, ports, var_list)),
            FuncExpr::Or(a, b) => Self::compile(a, vars, ports, var_list)
                .or(&Self::compile(b, vars, ports, var_list)),
            FuncExpr::Xor(a, b) => Self::compile(a, vars, ports, var_list)
                .xor(&Self::compile(b, vars, ports, var_list)),
        }
    }

    pub fn ports(&self) -> &[CompactString] {
        &self.ports
    }

    pub fn port_index(&self, port: &str) -> Option<usize> {
        self.ports.iter().position(|p| p == port)
    }

    /// Probability the function is true. `var_duty[i]` is the duty of
    /// `ports()[i]`.
    pub fn duty(&self, var_duty: &[f64]) -> f64 {
        probability(&self.bdd, var_duty)
    }

    /// Probability that toggling port `idx` toggles the function.
    pub fn diff_duty(&self, idx: usize, var_duty: &[f64]) -> f64 {
        let var = self.vars.variables()[idx];
        let diff = self
            .bdd
            .var_restrict(var, true)
            .xor(&self.bdd.var_restrict(var, false));
        probability(&diff, var_duty)
    }
}

fn probability(bdd: &Bdd, var_duty: &[f64]) -> f64 {
    fn walk(
        bdd: &Bdd,
        p: BddPointer,
        var_duty: &[f64],
        cache: &mut HashMap<BddPointer, f64>,
    ) -> f64 {
        if p.is_terminal() {
            return if p.is_one() { 1.0 } else { 0.0 };
        }
        if let Some(&v) = cache.get(&p) {
            return v;
        }
        let var = bdd.var_of(p).to_index();
        let d = var_duty.get(var).copied().unwrap_or(0.0);
        let lo = walk(bdd, bdd.low_link_of(p), var_duty, cache);
        let hi = walk(bdd, bdd.high_link_of(p), var_duty, cache);
        let v = lo * (1.0 - d) + hi * d;
        cache.insert(p, v);
        v
    }
    let mut cache = HashMap::new();
    walk(bdd, bdd.root_pointer(), var_duty, &mut cache)
}

/// Output activity of `expr` given the activity of each referenced port.
pub fn evaluate_activity(
    expr: &FuncExpr,
    port_activity: impl Fn(&str) -> ActivityRecord,
) -> ActivityRecord {
    let func = FuncBdd::build(expr);
    let inputs: Vec<ActivityRecord> = func.ports().iter().map(|p| port_activity(p.as_str())).collect();
    let var_duty: Vec<f64> = inputs.iter().map(|a| a.duty()).collect();
    let duty = func.duty(&var_duty);
    let density = inputs
        .iter()
        .enumerate()
        .filter(|(_, a)| a.density() > 0.0)
        .map(|(i, a)| a.density() * func.diff_duty(i, &var_duty))
        .sum::<f64>();
    ActivityRecord::new(density, duty, ActivityOrigin::Propagated)
}

/// Probability that `port` is observable at the output of `expr`. Zero when
/// the function does not reference the port.
pub fn diff_duty(
    expr: &FuncExpr,
    port: &str,
    port_activity: impl Fn(&str) -> ActivityRecord,
) -> f64 {
    let func = FuncBdd::build(expr);
    let Some(idx) = func.port_index(port) else {
        return 0.0;
    };
    let var_duty: Vec<f64> = func.ports().iter().map(|p| port_activity(p.as_str()).duty()).collect();
    func.diff_duty(idx, &var_duty)
}

/// Probability that `expr` is true.
pub fn expr_duty(expr: &FuncExpr, port_activity: impl Fn(&str) -> ActivityRecord) -> f64 {
    let func = FuncBdd::build(expr);
    let var_duty: Vec<f64> = func.ports().iter().map(|p| port_activity(p.as_str()).duty()).collect();
    func.duty(&var_duty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(name: &str) -> ActivityRecord {
        match name {
            "A" => ActivityRecord::new(1e8, 0.3, ActivityOrigin::Input),
            "B" => ActivityRecord::new(1e8, 0.4, ActivityOrigin::Input),
            _ => ActivityRecord::unknown(),
        }
    }

    fn eval(text: &str) -> ActivityRecord {
        evaluate_activity(&FuncExpr::parse(text).unwrap(), inputs)
    }

    #[test]
    fn test_and_or_xor() {
        let and = eval("A & B");
        assert!((and.duty() - 0.12).abs() < 1e-12);
        // 1e8*0.4 + 1e8*0.3
        assert!((and.density() - 7e7).abs() < 1e-3);
        assert_eq!(and.origin(), ActivityOrigin::Propagated);

        let or = eval("A | B");
        assert!((or.duty() - 0.58).abs() < 1e-12);
        // 1e8*0.6 + 1e8*0.7
        assert!((or.density() - 1.3e8).abs() < 1e-3);

        let xor = eval("A ^ B");
        assert!((xor.duty() - 0.46).abs() < 1e-12);
        assert!((xor.density() - 2e8).abs() < 1e-3);
    }

    #[test]
    fn test_inverter_and_constants() {
        let inv = eval("!A");
        assert!((inv.duty() - 0.7).abs() < 1e-12);
        assert!((inv.density() - 1e8).abs() < 1e-3);

        let one = eval("1");
        assert_eq!(one.duty(), 1.0);
        assert_eq!(one.density(), 0.0);

        // A & !A is constant false
        let never = eval("A !A");
        assert_eq!(never.duty(), 0.0);
        assert_eq!(never.density(), 0.0);
    }

    #[test]
    fn test_diff_duty() {
        let expr = FuncExpr::parse("A & B").unwrap();
        assert!((diff_duty(&expr, "A", inputs) - 0.4).abs() < 1e-12);
        assert!((diff_duty(&expr, "B", inputs) - 0.3).abs() < 1e-12);
        assert_eq!(diff_duty(&expr, "C", inputs), 0.0);
        assert!((expr_duty(&expr, inputs) - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_mux() {
        // S selects B; duty of S defaults to 0 through the unknown record
        let expr = FuncExpr::parse("(A & !S) | (B & S)").unwrap();
        let act = evaluate_activity(&expr, inputs);
        assert!((act.duty() - 0.3).abs() < 1e-12);
        assert!((act.density() - 1e8).abs() < 1e-3);
    }
}
