pub mod safe_interval;
pub mod types;

pub use safe_interval::{Interval, SafeIntervalTable};
pub use types::{Constraint, Move, NodeId, SPath, Time};
