//! Navigation hook for expired sessions.

/// Sends the user to a login surface.
///
/// The request pipeline calls [`Navigator::redirect_to_login`] exactly once
/// per 401 response, after clearing stored credentials. It is the only place
/// that triggers navigation.
pub trait Navigator: Send + Sync {
    /// Redirect to the login surface.
    fn redirect_to_login(&self);
}

impl<F> Navigator for F
where
    F: Fn() + Send + Sync,
{
    fn redirect_to_login(&self) {
        self()
    }
}

/// Navigator for headless use; only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self) {
        tracing::info!("session expired, login required");
    }
}
