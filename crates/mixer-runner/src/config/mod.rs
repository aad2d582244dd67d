pub mod schema;

pub use schema::{BrowserConfig, Config, Viewport};
