//! # Integration Scenarios
//!
//! Each module drives public APIs only; test doubles come from the
//! components' own `ports::outbound` modules.

pub mod bus_semantics;
pub mod registration_flows;
pub mod request_flows;
pub mod runtime_flows;
