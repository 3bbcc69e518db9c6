//! Subsystems: one module per table family, each with its schema initializer,
//! its `impl Engine` operations and its CLI group.

pub mod bid;
pub mod decision;
pub mod directory;
pub mod feedback;
pub mod tender;
