//! Integration tests for the budget client.
//! These exercise the public API end to end against mocked transports.

pub mod test_harness;

mod dedup_breaker_test;
mod http_end_to_end_test;
mod refresh_burst_test;
mod session_flow_test;
