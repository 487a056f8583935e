// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits consumed and exposed by the pipeline engine.
//!
//! Plugins implement [`ProcessingUnit`] or [`Router`]; the engine hands them a
//! [`PipelineHandle`] and reports lifecycle events to a [`PipelineObserver`].
//! Async methods use `#[async_trait]` for dynamic dispatch compatibility.

pub mod handle;
pub mod observer;
pub mod router;
pub mod unit;

pub use handle::PipelineHandle;
pub use observer::{NoopObserver, PipelineObserver};
pub use router::Router;
pub use unit::ProcessingUnit;
