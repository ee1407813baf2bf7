//! Mock providers

mod providers;

pub use providers::{FailingLlm, HashEmbedder, StaticLlm};
