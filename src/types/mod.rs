pub mod bar;
pub mod query;

pub use bar::*;
pub use query::*;
