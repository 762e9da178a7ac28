pub mod dataset;
pub mod job;
pub mod mapping;
