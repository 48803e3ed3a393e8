//! # Tasklet Module
//!
//! Tasklets are single-task operations that don't follow the chunk-oriented processing pattern.
//! The survey tasklet sends one batch per execution and moves the cursor kept in the table.

pub mod survey;
