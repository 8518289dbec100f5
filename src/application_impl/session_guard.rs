use crate::application_port::*;
use crate::domain_model::AccessToken;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum GuardDecision {
    Proceed(AccessToken),
    RedirectToLogin(SessionError),
}

impl GuardDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, GuardDecision::Proceed(_))
    }
}

/// What a protected page asks before rendering. Any failure means "go to login".
pub struct SessionGuard {
    session: Arc<dyn SessionService>,
}

impl SessionGuard {
    pub fn new(session: Arc<dyn SessionService>) -> Self {
        SessionGuard { session }
    }

    pub async fn check(&self) -> GuardDecision {
        match self.session.validate_and_refresh_token().await {
            Ok(token) => GuardDecision::Proceed(token),
            Err(e) => {
                tracing::warn!("session unusable, redirecting to login: {}", e);
                GuardDecision::RedirectToLogin(e)
            }
        }
    }
}
