//! Shared application services handed to every handler.

use std::sync::Arc;

use classroom_infra::Store;

use crate::app::gateway::LiveGateway;

pub struct AppServices {
    store: Arc<dyn Store>,
    gateway: LiveGateway,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>, gateway: LiveGateway) -> Self {
        Self { store, gateway }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn gateway(&self) -> &LiveGateway {
        &self.gateway
    }
}
