//! Shared application state.

use tableside_engine::Engine;

use crate::auth::JwtVerifier;

/// Handed to every handler. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Engine,
    pub jwt: JwtVerifier,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        let jwt = JwtVerifier::new(&engine.config().auth.jwt_secret);
        AppState { engine, jwt }
    }
}
