//! Unit test harness (registered as the `unit` test target).

mod graph_invariants;
mod operator_mapping;
mod parameter_rules;
