//! Domain records shared by repositories, services and the boundary layer.
//!
//! # Responsibility
//! - Define the canonical shapes of variables, calculations and resources.
//! - Keep wire naming (`calculatedValue`, `parentId`) in one place via serde.
//!
//! # Invariants
//! - Ids are store-assigned integers and never reused.
//! - `Calculation::calculated_value` is derived data; only recalculation
//!   writes it.

pub mod calculation;
pub mod resource;
pub mod variable;
