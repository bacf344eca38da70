// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Error type shared by the loaders, configuration and the activity setters.
//!
//! Estimation itself never fails: missing models contribute zero power.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("liberty syntax error at byte {pos}: {msg}")]
    Liberty { pos: usize, msg: String },

    #[error("invalid function expression \"{expr}\": {msg}")]
    FuncExpr { expr: String, msg: String },

    #[error("netlist error: {0}")]
    Netlist(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("VCD error: {0}")]
    Vcd(String),

    #[error("invalid activity (density {density}, duty {duty}): {reason}")]
    InvalidActivity {
        density: f64,
        duty: f64,
        reason: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
