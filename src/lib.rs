//! # SCA DAQ Core Library
//!
//! Trace acquisition and target command orchestration for side-channel evaluation of
//! a cryptographic accelerator. One control thread configures a capture scope against
//! the target's clock, drives fixed-vs-random (FVSR) workloads over the target's
//! serial console, and pairs every batch of traces with the target's reply.
//!
//! ## Crate Structure
//!
//! - **`capture`**: `ClockPlan` derivation and the `CaptureController` state machine
//!   (lock, arm, single or segmented capture).
//! - **`protocol`**: the uJSON wire format and the `CommandChannel` that finds replies in
//!   interleaved console output.
//! - **`fvsr`**: the closed set of FVSR operations and the `FvsrOrchestrator`.
//! - **`campaign`**: the per-batch send / arm / capture / read loop.
//! - **`glitch`**: crowbar voltage-glitch setup and arming.
//! - **`hardware`**: capability traits for scope, glitcher and target console, plus mock
//!   and serial implementations.
//! - **`config`**: TOML + environment configuration loaded with `figment`.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: the `ScaError` enum shared by every module.
//! - **`validation`**: small value validators used by `config` and `capture`.

pub mod campaign;
pub mod capture;
pub mod config;
pub mod error;
pub mod fvsr;
pub mod glitch;
pub mod hardware;
pub mod logging;
pub mod protocol;
pub mod validation;

pub use error::{AppResult, ScaError};
