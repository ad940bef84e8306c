//! # devicetest-core
//!
//! Core library for end-to-end mobile UI tests driven through Appium.
//!
//! This crate resolves which platform and environment a test run targets,
//! builds the matching capability set, launches a local Appium server when
//! needed, opens a session, and offers the small input and tap helpers test
//! specs are written with.
//!
//! ## Modules
//!
//! - [`config`] - Run configuration resolved once from the environment
//! - [`capabilities`] - Capability sets for Android and iOS, local and remote
//! - [`driver`] - The [`AutomationDriver`](driver::AutomationDriver) trait and its errors
//! - [`webdriver`] - HTTP implementation of the driver for Appium and hosted grids
//! - [`element`] - Element handles, locators and geometry
//! - [`gesture`] - Press/release touch gestures
//! - [`readiness`] - Polling with bounded backoff
//! - [`server`] - Launching a detached local Appium server
//! - [`session`] - Opening sessions and waiting for the app
//! - [`interaction`] - Text entry and tap helpers
//!
//! ## External Dependencies
//!
//! Local runs need the `appium` executable on `PATH` and an emulator or
//! simulator it can reach. Remote runs need `SAUCE_USERNAME` and
//! `SAUCE_ACCESS_KEY`.
//!
//! ## Example
//!
//! ```no_run
//! use devicetest_core::config::TestConfig;
//! use devicetest_core::element::Locator;
//! use devicetest_core::interaction::{enter_text, tap_center};
//! use devicetest_core::server::{start_local_server, ServerLaunchConfig};
//! use devicetest_core::session::{start_session, SessionOptions};
//! use devicetest_core::driver::AutomationDriver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TestConfig::from_env();
//! if config.is_local_environment() {
//!     start_local_server(&ServerLaunchConfig::for_config(&config)).await?;
//! }
//!
//! let session = start_session(&config, &SessionOptions::default()).await?;
//! let title = session
//!     .driver()
//!     .find_element(&Locator::AccessibilityId("post-title".into()))
//!     .await?;
//! tap_center(session.driver(), &title).await?;
//! enter_text(session.driver(), &title, "Hello", true).await?;
//! session.end().await?;
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod config;
pub mod driver;
pub mod element;
pub mod gesture;
pub mod interaction;
pub mod readiness;
pub mod server;
pub mod session;
pub mod webdriver;
