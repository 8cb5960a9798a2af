mod config;
mod module;
mod store;

pub use config::*;
pub use module::*;
pub use store::*;
