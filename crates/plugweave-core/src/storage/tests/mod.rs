pub mod config_tests;
pub mod disabled_tests;
