mod build_tests;
mod common;
mod repo_tests;
