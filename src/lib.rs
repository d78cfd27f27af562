pub mod clique;
pub mod config;
pub mod db;
pub mod eligibility;
pub mod graph;
pub mod groups;
pub mod matching;
pub mod models;
pub mod report;
pub mod scoring;
pub mod store;

pub use config::MatchingConfig;
pub use matching::MatchService;
pub use store::{InMemoryStore, MatchingBackend};
