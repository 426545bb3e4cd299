//! Model lifecycle management

mod manager;

pub use manager::{ResourceManager, ResourceState};
