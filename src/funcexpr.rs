// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Liberty Boolean function expressions.
//!
//! Parses the strings found in `function`, `when`, `next_state`,
//! `clocked_on`, `enable` and `data_in` attributes. Operator precedence,
//! tightest first: `!` and postfix `'`, then `^`, then `&`/`*`/juxtaposition,
//! then `|`/`+`.

use crate::error::{Error, Result};
use compact_str::CompactString;
use indexmap::IndexSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FuncExpr {
    Zero,
    One,
    Port(CompactString),
    Not(Box<FuncExpr>),
    And(Box<FuncExpr>, Box<FuncExpr>),
    Or(Box<FuncExpr>, Box<FuncExpr>),
    Xor(Box<FuncExpr>, Box<FuncExpr>),
}

/// Unateness of an output with respect to one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingSense {
    PositiveUnate,
    NegativeUnate,
    NonUnate,
    Unknown,
}

impl TimingSense {
    /// Map a liberty `timing_sense` value.
    pub fn from_liberty(value: &str) -> TimingSense {
        match value {
            "positive_unate" => TimingSense::PositiveUnate,
            "negative_unate" => TimingSense::NegativeUnate,
            "non_unate" => TimingSense::NonUnate,
            _ => TimingSense::Unknown,
        }
    }
}

/// Beyond this many inputs unateness is not enumerated.
const MAX_UNATE_INPUTS: usize = 16;

impl FuncExpr {
    pub fn parse(text: &str) -> Result<FuncExpr> {
        let mut parser = ExprParser { text, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(ch) = parser.peek() {
            return Err(parser.error(format!("unexpected '{}'", ch as char)));
        }
        Ok(expr)
    }

    pub fn port_ref(name: &str) -> FuncExpr {
        FuncExpr::Port(CompactString::from(name))
    }

    pub fn not(expr: FuncExpr) -> FuncExpr {
        FuncExpr::Not(Box::new(expr))
    }

    pub fn and(a: FuncExpr, b: FuncExpr) -> FuncExpr {
        FuncExpr::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: FuncExpr, b: FuncExpr) -> FuncExpr {
        FuncExpr::Or(Box::new(a), Box::new(b))
    }

    pub fn xor(a: FuncExpr, b: FuncExpr) -> FuncExpr {
        FuncExpr::Xor(Box::new(a), Box::new(b))
    }

    /// The port name when the whole expression is a bare port reference.
    pub fn port(&self) -> Option<&str> {
        match self {
            FuncExpr::Port(name) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Referenced ports, each once, in order of first appearance.
    pub fn ports(&self) -> Vec<CompactString> {
        let mut set = IndexSet::new();
        self.collect_ports(&mut set);
        set.into_iter().collect()
    }

    fn collect_ports(&self, set: &mut IndexSet<CompactString>) {
        match self {
            FuncExpr::Zero | FuncExpr::One => {}
            FuncExpr::Port(name) => {
                set.insert(name.clone());
            }
            FuncExpr::Not(e) => e.collect_ports(set),
            FuncExpr::And(a, b) | FuncExpr::Or(a, b) | FuncExpr::Xor(a, b) => {
                a.collect_ports(set);
                b.collect_ports(set);
            }
        }
    }

    pub fn has_port(&self, port: &str) -> bool {
        match self {
            FuncExpr::Zero | FuncExpr::One => false,
            FuncExpr::Port(name) => name == port,
            FuncExpr::Not(e) => e.has_port(port),
            FuncExpr::And(a, b) | FuncExpr::Or(a, b) | FuncExpr::Xor(a, b) => {
                a.has_port(port) || b.has_port(port)
            }
        }
    }

    pub fn eval(&self, value: &dyn Fn(&str) -> bool) -> bool {
        match self {
            FuncExpr::Zero => false,
            FuncExpr::One => true,
            FuncExpr::Port(name) => value(name),
            FuncExpr::Not(e) => !e.eval(value),
            FuncExpr::And(a, b) => a.eval(value) && b.eval(value),
            FuncExpr::Or(a, b) => a.eval(value) || b.eval(value),
            FuncExpr::Xor(a, b) => a.eval(value) ^ b.eval(value),
        }
    }

    /// Unateness of the function with respect to `port`, found by
    /// enumerating the other inputs.
    pub fn unateness(&self, port: &str) -> TimingSense {
        let ports = self.ports();
        let Some(target) = ports.iter().position(|p| p == port) else {
            return TimingSense::Unknown;
        };
        if ports.len() > MAX_UNATE_INPUTS {
            return TimingSense::NonUnate;
        }
        let mut rising = false;
        let mut falling = false;
        for mask in 0u32..(1u32 << ports.len()) {
            if mask & (1 << target) != 0 {
                continue;
            }
            let eval_with = |m: u32| {
                self.eval(&|name: &str| {
                    ports
                        .iter()
                        .position(|p| p == name)
                        .map(|i| m & (1 << i) != 0)
                        .unwrap_or(false)
                })
            };
            let low = eval_with(mask);
            let high = eval_with(mask | (1 << target));
            rising |= high && !low;
            falling |= low && !high;
        }
        match (rising, falling) {
            (true, true) => TimingSense::NonUnate,
            (true, false) => TimingSense::PositiveUnate,
            (false, true) => TimingSense::NegativeUnate,
            (false, false) => TimingSense::Unknown,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncExpr::And(..) | FuncExpr::Or(..) | FuncExpr::Xor(..) => write!(f, "({})", self),
            _ => write!(f, "{}", self),
        }
    }
}

impl fmt::Display for FuncExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncExpr::Zero => f.write_str("0"),
            FuncExpr::One => f.write_str("1"),
            FuncExpr::Port(name) => f.write_str(name),
            FuncExpr::Not(e) => {
                f.write_str("!")?;
                e.fmt_operand(f)
            }
            FuncExpr::And(a, b) | FuncExpr::Or(a, b) | FuncExpr::Xor(a, b) => {
                let op = match self {
                    FuncExpr::And(..) => " & ",
                    FuncExpr::Or(..) => " | ",
                    _ => " ^ ",
                };
                a.fmt_operand(f)?;
                f.write_str(op)?;
                b.fmt_operand(f)
            }
        }
    }
}

fn is_ident_byte(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'[' | b']' | b'.' | b'$')
}

/// Recursive-descent parser over the expression bytes.
struct ExprParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn error(&self, msg: String) -> Error {
        Error::FuncExpr {
            expr: self.text.to_string(),
            msg: format!("{} at offset {}", msg, self.pos),
        }
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && matches!(bytes[self.pos], b' ' | b'\t' | b'\n' | b'\r' | b'\\')
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.text.as_bytes().get(self.pos).copied()
    }

    fn parse_or(&mut self) -> Result<FuncExpr> {
        let mut lhs = self.parse_and()?;
        while let Some(b'|' | b'+') = self.peek() {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = FuncExpr::or(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<FuncExpr> {
        let mut lhs = self.parse_xor()?;
        loop {
            match self.peek() {
                Some(b'&' | b'*') => {
                    self.pos += 1;
                }
                // juxtaposition is an implicit AND
                Some(ch) if ch == b'(' || ch == b'!' || is_ident_byte(ch) => {}
                _ => break,
            }
            let rhs = self.parse_xor()?;
            lhs = FuncExpr::and(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<FuncExpr> {
        let mut lhs = self.parse_unary()?;
        while let Some(b'^') = self.peek() {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = FuncExpr::xor(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<FuncExpr> {
        if self.peek() == Some(b'!') {
            self.pos += 1;
            return Ok(FuncExpr::not(self.parse_unary()?));
        }
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(b'\'') {
            self.pos += 1;
            expr = FuncExpr::not(expr);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<FuncExpr> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let expr = self.parse_or()?;
                if self.peek() != Some(b')') {
                    return Err(self.error("expected ')'".to_string()));
                }
                self.pos += 1;
                Ok(expr)
            }
            Some(ch) if is_ident_byte(ch) => {
                let start = self.pos;
                let bytes = self.text.as_bytes();
                while self.pos < bytes.len() && is_ident_byte(bytes[self.pos]) {
                    self.pos += 1;
                }
                Ok(match &self.text[start..self.pos] {
                    "0" => FuncExpr::Zero,
                    "1" => FuncExpr::One,
                    name => FuncExpr::port_ref(name),
                })
            }
            Some(ch) => Err(self.error(format!("unexpected '{}'", ch as char))),
            None => Err(self.error("unexpected end of expression".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth(expr: &FuncExpr, a: bool, b: bool) -> bool {
        expr.eval(&|p: &str| match p {
            "A" => a,
            "B" => b,
            _ => false,
        })
    }

    #[test]
    fn test_parse_operators() {
        let and = FuncExpr::parse("A & B").unwrap();
        let and2 = FuncExpr::parse("(A B)").unwrap();
        let and3 = FuncExpr::parse("A*B").unwrap();
        assert_eq!(and, and2);
        assert_eq!(and, and3);

        let or = FuncExpr::parse("A + B").unwrap();
        assert_eq!(or, FuncExpr::parse("A|B").unwrap());

        let nand = FuncExpr::parse("!(A & B)").unwrap();
        assert_eq!(nand, FuncExpr::parse("(A*B)'").unwrap());
        assert!(!truth(&nand, true, true));
        assert!(truth(&nand, true, false));

        let xor = FuncExpr::parse("A ^ B").unwrap();
        assert!(truth(&xor, true, false));
        assert!(!truth(&xor, true, true));
    }

    #[test]
    fn test_precedence() {
        // & binds tighter than |
        let e = FuncExpr::parse("A | B & C").unwrap();
        assert_eq!(
            e,
            FuncExpr::or(
                FuncExpr::port_ref("A"),
                FuncExpr::and(FuncExpr::port_ref("B"), FuncExpr::port_ref("C"))
            )
        );
        // ' binds tighter than juxtaposition
        let e = FuncExpr::parse("A B'").unwrap();
        assert_eq!(
            e,
            FuncExpr::and(FuncExpr::port_ref("A"), FuncExpr::not(FuncExpr::port_ref("B")))
        );
    }

    #[test]
    fn test_constants_and_ports() {
        assert_eq!(FuncExpr::parse("0").unwrap(), FuncExpr::Zero);
        assert_eq!(FuncExpr::parse(" 1 ").unwrap(), FuncExpr::One);
        let e = FuncExpr::parse("(A1 & A2) | (B1 & A1)").unwrap();
        let ports: Vec<String> = e.ports().iter().map(|p| p.to_string()).collect();
        assert_eq!(ports, vec!["A1", "A2", "B1"]);
        assert!(e.has_port("B1"));
        assert!(!e.has_port("B2"));
        assert_eq!(FuncExpr::parse("IQ").unwrap().port(), Some("IQ"));
        assert_eq!(e.port(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(FuncExpr::parse("").is_err());
        assert!(FuncExpr::parse("(A & B").is_err());
        assert!(FuncExpr::parse("A & ").is_err());
        assert!(matches!(
            FuncExpr::parse("A ) B"),
            Err(Error::FuncExpr { .. })
        ));
    }

    #[test]
    fn test_display_reparses() {
        let e = FuncExpr::parse("!(A ^ B) | C D'").unwrap();
        let again = FuncExpr::parse(&e.to_string()).unwrap();
        assert_eq!(e, again);
    }

    #[test]
    fn test_unateness() {
        let nand = FuncExpr::parse("!(A & B)").unwrap();
        assert_eq!(nand.unateness("A"), TimingSense::NegativeUnate);
        let or = FuncExpr::parse("A | B").unwrap();
        assert_eq!(or.unateness("B"), TimingSense::PositiveUnate);
        let xor = FuncExpr::parse("A ^ B").unwrap();
        assert_eq!(xor.unateness("A"), TimingSense::NonUnate);
        assert_eq!(xor.unateness("C"), TimingSense::Unknown);
    }
}
