mod handler;
mod model;

pub use handler::{get_entry, get_friends};
