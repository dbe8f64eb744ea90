pub mod aggregation;
pub mod results;
pub mod sessions;
pub mod statistics;
