use axum::extract::FromRef;

use crate::service::KnobGalleryService;
use std::sync::Arc;
use std::time::Instant;

pub type GuardedService = Arc<KnobGalleryService>;

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub service: GuardedService,
}

impl ServerState {
    pub fn new(service: GuardedService) -> Self {
        Self {
            start_time: Instant::now(),
            service,
        }
    }
}

impl FromRef<ServerState> for GuardedService {
    fn from_ref(input: &ServerState) -> Self {
        input.service.clone()
    }
}
