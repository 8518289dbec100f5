use crate::application_port::{SessionError, SessionService};
use std::sync::Arc;

/// Request-side interceptor: makes sure the session is usable, then attaches the
/// bearer token. An error means the caller should send the user to login.
#[derive(Clone)]
pub struct BearerAuth {
    session: Arc<dyn SessionService>,
}

impl BearerAuth {
    pub fn new(session: Arc<dyn SessionService>) -> Self {
        BearerAuth { session }
    }

    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, SessionError> {
        let token = self.session.validate_and_refresh_token().await?;
        Ok(request.bearer_auth(token.as_str()))
    }
}
