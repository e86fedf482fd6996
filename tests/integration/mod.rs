//! Integration test harness (registered as the `integration` test target).

mod compile_scenarios;
mod http_api;
