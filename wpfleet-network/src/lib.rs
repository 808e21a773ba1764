//! Real-world DNS resolution for custom-domain validation.
//!
//! Unlike a service-discovery resolver that simulates `.internal` names for
//! local container-to-container traffic, this crate answers one question
//! for the domain manager: does a given hostname have an A record pointing
//! at our public ingress IP?

pub mod dns;

pub use dns::{DnsResolve, FakeResolver, SystemResolver};
