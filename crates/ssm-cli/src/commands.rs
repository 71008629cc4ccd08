//! Subcommand implementations.

pub mod cohort;
pub mod contour;
pub mod distance;
pub mod groom;
pub mod info;
pub mod reference;
