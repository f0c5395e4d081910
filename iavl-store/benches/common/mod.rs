//! Common benchmark configuration and utilities.
//!
//! All benchmark modules follow this structure:
//! 1. Configuration setup (using the constants in [config])
//! 2. Input data generation (the `generate_*` functions in [data])
//! 3. Benchmark functions, declared through the macros in [macros]
//! 4. Group definition and main export
//!
//! Benchmark functions are named `<structure>_<operation>` (e.g. `mutable_tree_set`,
//! `fast_cache_iterate`), input generators `generate_<data>_<pattern>` (e.g.
//! `generate_entries_random`).

#![allow(dead_code)] // benchmark use doesn't count as "usage" for linting

pub mod config;
pub mod data;
pub mod macros;
