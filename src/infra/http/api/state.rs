use std::sync::Arc;

use crate::application::repos::StoreHealth;
use crate::application::search::{EventSearchService, PageLimits};

#[derive(Clone)]
pub struct ApiState {
    pub search: Arc<EventSearchService>,
    pub health: Arc<dyn StoreHealth>,
    pub limits: PageLimits,
}
