//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the catalog and the indexing
//! endpoint, and drive full runs through the orchestrator.

mod common;
mod fetcher_tests;
mod orchestrator_tests;
