//! # plugwatch-domain
//!
//! Pure domain model for the plugwatch plug fleet coordinator.
//!
//! ## Responsibilities
//! - Foundational types: plug addresses, power states, error taxonomy
//! - Define **Plugs** (network power switches and their per-plug policy)
//! - Define **Countdown sessions** (generation-tagged automatic-shutdown timers)
//! - Define **Events** (records fanned out to observers)
//! - Define **Machine signals** (busy reasons and heater temperature readings)
//! - Define **Fleet settings** (the immutable-at-rest configuration snapshot)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod countdown;
pub mod error;
pub mod event;
pub mod machine;
pub mod plug;
pub mod settings;
