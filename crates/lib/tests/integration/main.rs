//! End-to-end tests for graph registration and execution.

mod common;

mod build_tests;
mod manifest_tests;
mod module_tests;
mod surgery_tests;
