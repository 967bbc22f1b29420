//! Core trait abstractions for external collaborators.
//!
//! The pipeline consumes its collaborators (HTTP, persistence,
//! qualification) through these narrow seams; concrete implementations
//! live in [`crate::fetch`], [`crate::stores`], [`crate::qualify`], and
//! [`crate::testing`].

pub mod fetcher;
pub mod qualifier;
pub mod store;

pub use fetcher::Fetcher;
pub use qualifier::{Qualification, Qualifier};
pub use store::{CreditStore, JobStore, LeadStore, PipelineStore};
