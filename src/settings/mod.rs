pub mod app;
pub mod loader;

pub use app::*;
pub use loader::*;
