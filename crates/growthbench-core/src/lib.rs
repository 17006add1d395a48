pub mod analysis;
pub mod catalog;
pub mod db;
pub mod engine;
pub mod errors;
pub mod explain;
pub mod model;
pub mod stats;

pub mod report;
pub mod storage;
