pub mod dispatch;
pub mod migrate;
pub mod plan;
pub mod serve;
