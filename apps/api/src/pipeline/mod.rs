// Document pipeline core: completeness scoring, multi-source merge, and
// declarative field mapping. Everything here is pure and synchronous; the
// orchestrator in `generation` drives it.

pub mod calculations;
pub mod completeness;
pub mod mapper;
pub mod merge;
pub mod path;
pub mod transforms;

pub use mapper::map_data;
pub use merge::merge;
