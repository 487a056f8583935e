// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline definitions and the controller that runs them.
//!
//! A [`PipelineDefinition`] is parsed once and shared read-only. A
//! [`PipelineController`] drives runs of one definition against a
//! [`PluginRegistry`](vispipe_plugin::PluginRegistry): it executes nodes one at
//! a time, resolves routing, suspends on asynchronous units until their
//! feedback arrives, and supports pause, resume, and retry of a failed node.

pub mod controller;
pub mod definition;
pub mod handle;

pub use controller::{PipelineController, PipelineControllerBuilder};
pub use definition::{NodeConfig, PipelineDefinition};
pub use handle::ControllerHandle;
