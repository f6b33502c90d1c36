use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::users::{UserService, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub users: UserService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn UserStore>) -> Self {
        Self {
            settings: Arc::new(settings),
            users: UserService::new(store),
            start_time: Instant::now(),
        }
    }
}
