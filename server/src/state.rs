use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::router::RoomRouter;
use crate::storage::Store;

pub const DEFAULT_SHAPE_PAGE: usize = 20;
pub const DEFAULT_CHAT_PAGE: usize = 50;
pub const MAX_PAGE: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub router: RoomRouter,
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    /// Spawns the room router, so this must run inside a tokio runtime.
    pub fn new(store: Arc<dyn Store>, verifier: TokenVerifier) -> Self {
        Self {
            store,
            router: RoomRouter::spawn(),
            verifier: Arc::new(verifier),
        }
    }
}
