#![cfg(test)]

pub mod common;
pub mod classloader_tests;
pub mod pipeline_tests;
pub mod state_tests;
