//! Run statistics (C11), printed and optionally appended as a CSV row —
//! grounded on the teacher's `Stats::print`.

use std::fs::OpenOptions;
use std::io::Write;

use tracing::error;

use crate::config::Config;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub hl_expansions: usize,
    pub ll_searches: usize,
    pub ll_expanded: usize,
    pub runtime_secs: f64,
}

impl Stats {
    pub fn append_csv_row(&self, path: &str, config: &Config, found: bool, cost: f64) {
        let mut file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                error!("failed to open stats output file '{path}': {e}");
                return;
            }
        };

        let row = format!(
            "{},{},{},{},{},{},{:.6},{},{},{:.6}\n",
            config.connectedness,
            config.hlh_type,
            config.focal_weight,
            config.use_cardinal,
            config.use_disjoint_splitting,
            found,
            cost,
            self.hl_expansions,
            self.ll_searches,
            self.runtime_secs,
        );

        if let Err(e) = file.write_all(row.as_bytes()) {
            error!("failed to write to stats output file '{path}': {e}");
        }
    }
}
