//! Chrome DevTools Protocol backend.
//!
//! Connects to the user's running Chrome over its remote-debugging
//! WebSocket and exposes it as a [`crate::platform::TabPlatform`].
//!
//! ## Usage
//!
//! 1. Start Chrome with remote debugging:
//!    ```bash
//!    chrome --remote-debugging-port=9222
//!    ```
//!
//! 2. Connect:
//!    ```rust,ignore
//!    let platform = CdpPlatform::connect("http://localhost:9222").await?;
//!    ```

mod client;
mod error;
mod platform;
mod protocol;
mod session;

pub use client::CdpClient;
pub use error::CdpError;
pub use platform::CdpPlatform;
pub use protocol::*;
pub use session::PageSession;
