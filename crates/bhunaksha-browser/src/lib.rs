//! Browser automation adapter for the cadastral map portal.
//!
//! Exposes the narrow capability set the crawler needs (navigation,
//! element lookup, option selection, script execution, text reads) behind
//! the [`NavigationDriver`] trait, plus a Chromium-backed implementation
//! that launches one browser process per session.

pub mod chromium;
pub mod driver;
pub mod error;
pub mod wait;

pub use chromium::{ChromiumDriver, ChromiumSessionFactory};
pub use driver::{
    ElementHandle, Locator, NavigationDriver, OptionChoice, SelectOption, SessionFactory,
};
pub use error::{BrowserError, Result};
pub use wait::{wait_for_element, wait_for_options, wait_until, WaitBounds};
