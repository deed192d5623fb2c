//! Push transport seam.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::SessionIdentity;
use crate::Result;

/// Raw text frames from an open push connection.
///
/// The stream ends when the server closes the connection; an `Err` item means
/// the connection broke and the caller should reconnect.
pub type PushStream = BoxStream<'static, Result<String>>;

/// Opens push connections for a session.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a connection and complete the handshake.
    ///
    /// `resume_token` identifies the last state the client has seen so the
    /// server can skip what was already delivered.
    async fn open(
        &self,
        session: &SessionIdentity,
        resume_token: Option<String>,
    ) -> Result<PushStream>;
}
