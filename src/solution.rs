//! The solver's final output, assembled by the orchestrator (C8) and
//! optionally serialized to JSON (C11).

use serde::Serialize;

use crate::common::types::{SPath, Time};

#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub paths: Vec<SPath>,
    pub found: bool,
    pub timed_out: bool,
    pub cost: Time,
    pub flowtime: Time,
    pub makespan: Time,
    pub runtime_secs: f64,
    pub hl_expansions: usize,
    pub ll_searches: usize,
    pub ll_expanded: usize,
}
