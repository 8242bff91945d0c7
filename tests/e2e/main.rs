//! E2E test suite entry point.

mod boundaries;
mod degradation;
mod diversity;
mod fixture;
mod policy;
mod scenario;
mod symbols;
