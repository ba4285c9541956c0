//! # Agent Protocol Bridge Test Suite
//!
//! Scenarios that cross crate boundaries, run against the real bus.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── bus_semantics.rs      # Delivery, exactly-once, leak-freedom
//! │   ├── request_flows.rs      # Bridged request/reply round trips
//! │   ├── registration_flows.rs # Concurrent credential verification
//! │   └── runtime_flows.rs      # Ingress line → bus → bridge
//! └── benches/
//!     └── bus_benchmarks.rs     # Publish fan-out and webhook validation
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p agent-tests
//! cargo test -p agent-tests integration::registration_flows
//! cargo bench -p agent-tests
//! ```

pub mod integration;
