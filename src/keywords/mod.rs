pub mod local;

// Re-export common types
pub use local::{extract, KeywordCount};
