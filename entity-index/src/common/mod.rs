mod constants;
mod event_bus;
mod lock;
mod sort_order;
mod type_utils;

pub use constants::*;
pub use event_bus::*;
pub use lock::*;
pub use sort_order::*;
pub use type_utils::*;
