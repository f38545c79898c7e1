pub mod edges;
pub mod membership;

pub use edges::{EdgeStore, InMemoryEdgeStore, SurrealEdgeStore};
pub use membership::{InMemoryMembership, MembershipOracle, SurrealMembership};
