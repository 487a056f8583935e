// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Vispipe integration tests.
//!
//! Provides mock plugins and a test harness for fast, deterministic tests of
//! the pipeline engine without real feature extractors or storage.
//!
//! # Components
//!
//! - [`IncrementUnit`], [`PassthroughUnit`], [`FailingUnit`] - synchronous units
//! - [`GatedUnit`] - blocks until the test releases it
//! - [`AsyncUnit`] - asynchronous unit whose feedback the test delivers
//! - [`FixedRouter`], [`FlagRouter`] - deterministic routers
//! - [`RecordingObserver`] - captures lifecycle notifications
//! - [`TestHarness`] - registry, definition, and controller in one place

pub mod harness;
pub mod mock_router;
pub mod mock_unit;
pub mod observer;

pub use harness::{TestHarness, TestHarnessBuilder, params};
pub use mock_router::{FixedRouter, FlagRouter};
pub use mock_unit::{
    AsyncUnit, FailingUnit, GatedUnit, IncrementUnit, PassthroughUnit, PendingInvocation,
};
pub use observer::{ObservedEvent, RecordingObserver};
