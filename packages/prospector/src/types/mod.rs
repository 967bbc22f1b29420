//! Data model for jobs, leads, credits, and fetched pages.

pub mod credits;
pub mod job;
pub mod lead;
pub mod options;
pub mod page;
