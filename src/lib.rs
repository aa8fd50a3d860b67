pub mod distance;
pub mod error;
pub mod graph;
pub mod parser;
pub mod search;

pub use distance::DistanceTable;
pub use error::{Error, Result};
pub use graph::ValveGraph;
pub use search::{
    max_pressure, max_pressure_with_helper, DualAgentSearch, Outcome, SingleAgentSearch,
};
