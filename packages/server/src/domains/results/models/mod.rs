pub mod toss_result;

pub use toss_result::*;
