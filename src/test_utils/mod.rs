//! Shared test support: fixture corpus and deterministic collaborators.

pub mod doubles;
pub mod fixtures;

#[cfg(test)]
pub mod arbitrary;
