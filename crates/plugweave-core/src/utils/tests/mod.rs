pub mod fs_tests;
