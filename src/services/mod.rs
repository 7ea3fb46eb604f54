//! Storage backends and the scan pipeline built on top of them.

pub mod change_filter;
pub mod grant_signer;
pub mod local_store;
pub mod object_store;
pub mod propagator;
pub mod recorder;
pub mod scanner;
pub mod scheduler;
pub mod table_store;
pub mod watermark;
