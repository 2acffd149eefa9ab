//! Host application hook for expired sessions
//!
//! The coordinator only reports that the session is gone; what happens next
//! (redirect to login, re-auth prompt, exit) belongs to the host.

use super::error::RenewalError;

/// Receives a notification when a renewal wave fails
pub trait SessionListener: Send + Sync {
    /// Called once per failed renewal wave
    fn on_session_expired(&self, error: &RenewalError);
}

impl<F> SessionListener for F
where
    F: Fn(&RenewalError) + Send + Sync,
{
    fn on_session_expired(&self, error: &RenewalError) {
        self(error);
    }
}

/// Listener that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionListener;

impl SessionListener for NoopSessionListener {
    fn on_session_expired(&self, error: &RenewalError) {
        debug!("Session expired with no listener installed: {error}");
    }
}
