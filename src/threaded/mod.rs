//! Multi-threaded execution of the blocked driver.
//!
//! Work units are split into contiguous, balanced ranges, one per thread.
//! Each thread gets its own slice of the caller's workspace, so the only
//! shared mutable state is the output, and units never overlap there.

pub mod scheduler;
