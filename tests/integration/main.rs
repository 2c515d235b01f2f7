//! Integration tests for Sumi-Archive

mod capture_tests;
mod crawl_tests;
mod support;
