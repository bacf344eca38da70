// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Loom power: signal activity propagation and power estimation for
//! gate-level netlists.
//!
//! # Pipeline
//!
//! ```text
//! Liberty + Yosys JSON netlist
//!   → Design / LibrarySet   (netlist, liberty)
//!   → TimingGraph           (graph: wire and cell arcs, loop breaking, levels)
//!   → activities            (propagate: levelized sweep + register fixpoint)
//!   → per-instance power    (power: internal, switching, leakage)
//!   → PowerSummary          (report: category buckets, rankings)
//! ```
//!
//! # Key modules
//!
//! - [`activity`]: activity records, origins and the per-pin store
//! - [`funcexpr`] / [`bdd`]: Liberty functions and their probabilistic evaluation
//! - [`liberty`]: Liberty parser with power groups and lookup tables
//! - [`netlist`]: flattened design database with a Yosys JSON loader
//! - [`graph`]: timing graph with search policies and level queues
//! - [`clocks`]: clock definitions and the clock network
//! - [`propagate`]: the activity propagator
//! - [`power`]: the [`Power`] engine and per-instance estimation
//! - [`report`]: summaries, rankings and annotation coverage
//! - [`vcd_activity`]: activity annotation from VCD
//! - [`config`]: JSON run configuration

pub mod error;

pub mod activity;

pub mod funcexpr;

pub mod bdd;

pub mod liberty;

pub mod netlist;

pub mod graph;

pub mod clocks;

pub mod propagate;

pub mod power;

pub mod report;

pub mod vcd_activity;

pub mod config;

pub use activity::{ActivityOrigin, ActivityRecord};
pub use error::{Error, Result};
pub use power::{Corner, Power, PowerResult};
pub use report::{ActivityAnnotationReport, PowerCategory, PowerSummary};
