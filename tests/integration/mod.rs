//! End-to-end orchestrator tests against the in-memory fake collaborators.

mod insert_test;
mod merge_test;
mod read_test;
mod support;
mod truncate_test;
