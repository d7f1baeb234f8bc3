use config::Config;
use std::sync::Arc;
use store::UserStore;
use tracker::Tracker;

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod store;
pub mod tracker;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn UserStore>,
    pub tracker: Arc<Tracker>,
}
