mod handler;
mod model;

pub use handler::{my_rank, top_users};
