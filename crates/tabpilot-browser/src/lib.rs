//! # TabPilot Browser
//!
//! Drives engine tabs in the user's own browser without getting in the way.
//!
//! - [`platform`]: capability traits for the host browser, plus an
//!   in-memory fake
//! - [`cdp`]: Chrome DevTools Protocol implementation of those traits
//! - [`engines`]: engine ids, new-chat URLs and URL matching
//! - [`manager`]: engine tab registry, crawl window and tab group
//! - [`dispatch`]: `EXECUTE_TASK` / `TASK_RESULT` round trip with timeout
//! - [`handler`]: scheduler [`TaskHandler`](tabpilot_workqueue::TaskHandler)
//!   tying it together

pub mod cdp;
pub mod dispatch;
pub mod engines;
pub mod handler;
pub mod manager;
pub mod platform;

pub use dispatch::{ContentMessage, ContentResult, ExecutionDispatcher};
pub use engines::{EngineDef, EngineRegistry};
pub use handler::EngineTaskHandler;
pub use manager::{BrowserError, Placement, TabManager, TabManagerConfig};
pub use platform::{MemoryPlatform, MessageTransport, PlatformError, TabId, TabPlatform};
