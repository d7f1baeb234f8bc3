mod handler;
mod model;

pub use handler::{my_location, remove_location, upload_location};
