//! Page rendering through a headless browser.

mod config;
mod renderer;
mod session;

pub use config::BrowserEngineConfig;
pub use renderer::{PageRenderer, RenderError, RenderedPage, ResourceKind};
pub use session::{BrowserSession, ChromiumPage};
