pub mod config;
pub mod docid;
pub mod token;

pub use config::EngineConfig;
pub use docid::DocId;
pub use token::{Token, TokenMap};
