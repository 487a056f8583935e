// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin registry and built-in plugin catalog.
//!
//! The registry is an explicitly constructed catalogue of processing units and
//! routers, keyed by kind and name, shared by every controller it is handed to.
//! Each plugin is initialized exactly once, when it is first registered.

pub mod builtin;
pub mod catalog;
pub mod registry;

pub use builtin::GoToNode;
pub use catalog::{PluginDescriptor, builtin_catalog, register_builtins, search_catalog};
pub use registry::{PluginHandle, PluginRegistry};
