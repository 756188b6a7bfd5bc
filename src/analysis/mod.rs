//! Analysis modules.
//!
//! Topic classification, aggregation, context assembly and chart rendering
//! over the records held by the store.

pub mod aggregator;
pub mod charts;
pub mod classifier;
pub mod context;

pub use classifier::TopicClassifier;
