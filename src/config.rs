//! CLI surface and validated runtime configuration (C10). Out-of-domain
//! values are replaced with documented defaults and logged, never rejected
//! — grounded on the teacher's `Cli`/`Config` split in `config.rs`, with
//! the teacher's per-solver-variant checks replaced by simple per-field
//! domain clamping.

use clap::Parser;
use tracing::warn;

pub const DEFAULT_PRECISION: f64 = 1e-5;
pub const DEFAULT_USE_CARDINAL: bool = true;
pub const DEFAULT_USE_DISJOINT_SPLITTING: bool = true;
pub const DEFAULT_CONNECTEDNESS: i64 = 2;
pub const DEFAULT_FOCAL_WEIGHT: f64 = 1.0;
pub const DEFAULT_AGENT_SIZE: f64 = 0.353;
pub const DEFAULT_HLH_TYPE: i64 = 2;
pub const DEFAULT_TIMELIMIT: f64 = 30.0;

#[derive(Parser, Debug)]
#[command(
    name = "ctcbs",
    about = "Continuous-time Conflict-Based Search for Multi-Agent Path Finding.",
    version = "0.1"
)]
pub struct Cli {
    #[arg(long, help = "Path to the MovingAI .map file")]
    pub map_path: String,

    #[arg(long, help = "Path to the MovingAI .scen file")]
    pub scen_path: String,

    #[arg(long, default_value_t = 10, help = "Number of agents to draw from the scenario")]
    pub num_agents: usize,

    #[arg(long, default_value_t = 0, help = "Seed for deterministic agent shuffling")]
    pub seed: u64,

    #[arg(
        long,
        default_value_t = false,
        help = "Use scenario routes in file order instead of shuffling"
    )]
    pub deterministic_scen: bool,

    #[arg(long, help = "Optional path to append a CSV run-statistics row to")]
    pub output_path: Option<String>,

    #[arg(long, help = "Optional path to write the solution as pretty JSON")]
    pub solution_path: Option<String>,

    #[arg(long, default_value_t = DEFAULT_PRECISION, help = "Geometric slack epsilon")]
    pub precision: f64,

    #[arg(long, default_value_t = DEFAULT_USE_CARDINAL)]
    pub use_cardinal: bool,

    #[arg(long, default_value_t = DEFAULT_USE_DISJOINT_SPLITTING)]
    pub use_disjoint_splitting: bool,

    #[arg(long, default_value_t = DEFAULT_CONNECTEDNESS, help = "Grid neighborhood: 2, 3, 4 or 5")]
    pub connectedness: i64,

    #[arg(long, default_value_t = DEFAULT_FOCAL_WEIGHT, help = "Bounded-suboptimality factor, >= 1.0")]
    pub focal_weight: f64,

    #[arg(long, default_value_t = DEFAULT_AGENT_SIZE, help = "Agent disk radius in cells, in (0, 0.5]")]
    pub agent_size: f64,

    #[arg(long, default_value_t = DEFAULT_HLH_TYPE, help = "High-level heuristic: 0, 1 or 2")]
    pub hlh_type: i64,

    #[arg(long, default_value_t = DEFAULT_TIMELIMIT, help = "Wall-clock cap in seconds, 0 = unbounded")]
    pub timelimit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub precision: f64,
    pub use_cardinal: bool,
    pub use_disjoint_splitting: bool,
    pub connectedness: i64,
    pub focal_weight: f64,
    pub agent_size: f64,
    pub hlh_type: i64,
    pub timelimit: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            precision: DEFAULT_PRECISION,
            use_cardinal: DEFAULT_USE_CARDINAL,
            use_disjoint_splitting: DEFAULT_USE_DISJOINT_SPLITTING,
            connectedness: DEFAULT_CONNECTEDNESS,
            focal_weight: DEFAULT_FOCAL_WEIGHT,
            agent_size: DEFAULT_AGENT_SIZE,
            hlh_type: DEFAULT_HLH_TYPE,
            timelimit: DEFAULT_TIMELIMIT,
        }
    }
}

impl Config {
    /// Builds a `Config` from CLI flags, clamping every out-of-domain value
    /// to its default and warning about it rather than aborting.
    pub fn from_cli(cli: &Cli) -> Config {
        let mut config = Config::default();

        if cli.precision > 0.0 && cli.precision <= 1.0 {
            config.precision = cli.precision;
        } else {
            warn!(
                "invalid precision {}; using default {}",
                cli.precision, DEFAULT_PRECISION
            );
        }

        config.use_cardinal = cli.use_cardinal;
        config.use_disjoint_splitting = cli.use_disjoint_splitting;

        if (2..=5).contains(&cli.connectedness) {
            config.connectedness = cli.connectedness;
        } else {
            warn!(
                "invalid connectedness {}; using default {}",
                cli.connectedness, DEFAULT_CONNECTEDNESS
            );
        }

        if cli.focal_weight >= 1.0 {
            config.focal_weight = cli.focal_weight;
        } else {
            warn!(
                "invalid focal_weight {}; using default {}",
                cli.focal_weight, DEFAULT_FOCAL_WEIGHT
            );
        }

        if cli.agent_size > 0.0 && cli.agent_size <= 0.5 {
            config.agent_size = cli.agent_size;
        } else {
            warn!(
                "invalid agent_size {}; using default {}",
                cli.agent_size, DEFAULT_AGENT_SIZE
            );
        }

        if (0..=2).contains(&cli.hlh_type) {
            config.hlh_type = cli.hlh_type;
        } else {
            warn!(
                "invalid hlh_type {}; using default {}",
                cli.hlh_type, DEFAULT_HLH_TYPE
            );
        }

        config.timelimit = if cli.timelimit <= 0.0 {
            f64::INFINITY
        } else {
            cli.timelimit
        };

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_defaults() -> Cli {
        Cli {
            map_path: "m.map".into(),
            scen_path: "s.scen".into(),
            num_agents: 10,
            seed: 0,
            deterministic_scen: false,
            output_path: None,
            solution_path: None,
            precision: DEFAULT_PRECISION,
            use_cardinal: DEFAULT_USE_CARDINAL,
            use_disjoint_splitting: DEFAULT_USE_DISJOINT_SPLITTING,
            connectedness: DEFAULT_CONNECTEDNESS,
            focal_weight: DEFAULT_FOCAL_WEIGHT,
            agent_size: DEFAULT_AGENT_SIZE,
            hlh_type: DEFAULT_HLH_TYPE,
            timelimit: DEFAULT_TIMELIMIT,
        }
    }

    #[test]
    fn defaults_pass_through_unchanged() {
        let cli = cli_with_defaults();
        let config = Config::from_cli(&cli);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn out_of_domain_values_are_clamped_to_defaults() {
        let mut cli = cli_with_defaults();
        cli.connectedness = 99;
        cli.agent_size = 10.0;
        cli.focal_weight = 0.1;
        cli.hlh_type = -1;
        cli.precision = 2.0;

        let config = Config::from_cli(&cli);
        assert_eq!(config.connectedness, DEFAULT_CONNECTEDNESS);
        assert_eq!(config.agent_size, DEFAULT_AGENT_SIZE);
        assert_eq!(config.focal_weight, DEFAULT_FOCAL_WEIGHT);
        assert_eq!(config.hlh_type, DEFAULT_HLH_TYPE);
        assert_eq!(config.precision, DEFAULT_PRECISION);
    }

    #[test]
    fn zero_timelimit_means_unbounded() {
        let mut cli = cli_with_defaults();
        cli.timelimit = 0.0;
        let config = Config::from_cli(&cli);
        assert!(config.timelimit.is_infinite());
    }
}
