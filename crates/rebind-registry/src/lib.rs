#![forbid(unsafe_code)]

//! Component discovery for dependency-injection wiring at startup.
//!
//! Rust has no runtime type reflection, so discovery works from explicit
//! [`Candidate`] descriptions: each names a concrete type, the services it
//! implements, and optional per-type markers. A classification policy
//! sorts unmarked candidates into singleton or transient registration (or
//! skips them); the resulting [`ComponentScan`] feeds registration
//! handlers supplied by the container integration, which this crate knows
//! nothing about.

pub mod namespace;
pub mod scan;

pub use namespace::ModulePathFilter;
pub use scan::{Candidate, Component, ComponentScan, Marker, Registration, ServiceBinding};
