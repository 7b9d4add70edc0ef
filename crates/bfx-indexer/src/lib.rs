pub mod engine;
pub mod error;
pub mod router;
pub mod scoring;
pub mod sharded_store;

pub use engine::IndexEngine;
pub use error::IndexError;
pub use router::Routing;
pub use scoring::{evaluate, evaluate_routed, QueryMode, ScoreMap};
pub use sharded_store::ShardedStore;
