//! API request handlers

mod events;
mod health;
mod resources;

pub use events::*;
pub use health::*;
pub use resources::*;
