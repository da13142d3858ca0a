//! End-to-end tests against a mock API server

mod crawl_tests;
