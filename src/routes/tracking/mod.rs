mod handler;
mod model;

pub use handler::{deselect_friend, select_friend, tracking_status};
