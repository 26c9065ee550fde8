//! Tab/window resource manager.
//!
//! Hands out one automation tab per engine while staying out of the user's
//! way: tabs the user is looking at are never reused, and new tabs go into a
//! minimized crawl window or, failing that, a collapsed tab group.

mod manager_core;
mod manager_tabs;
mod manager_types;
mod manager_window;

pub use manager_core::TabManager;
pub use manager_types::{BrowserError, TabManagerConfig};
pub use manager_window::Placement;

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
