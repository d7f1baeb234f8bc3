mod handler;
mod model;

pub use handler::{catalog, my_achievements, user_achievements};
