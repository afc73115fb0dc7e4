//! Agent liveness and administrative status

mod registry;

pub use registry::AgentRegistry;
