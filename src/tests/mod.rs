//! Test suites for the threading system.
//!
//! The global TCB table is process-wide, so suites that reason about
//! occupancy serialize through [`helpers::table_guard`] and share one
//! `init` call.

mod helpers;
mod stress;
