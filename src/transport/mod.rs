//! Mail transport abstraction.
//!
//! The delivery engine treats the relay as an opaque capability with a
//! narrow contract: one call, one full session (connect, authenticate,
//! submit, disconnect). Tests inject a scripted implementation; production
//! uses [`SmtpSender`] backed by lettre.

pub mod smtp;

use crate::error::TransportError;
use async_trait::async_trait;
use lettre::{Address, Message};

pub use smtp::SmtpSender;

/// One-session-per-call mail transport.
///
/// Implementations must be `Send + Sync` to be shared across workers.
/// Retry policy is the caller's concern; an implementation only reports
/// the classified outcome of a single session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session, authenticate, submit one message, disconnect.
    async fn submit(&self, message: Message) -> Result<(), TransportError>;

    /// Open a session and authenticate without submitting anything.
    ///
    /// Used by the connectivity pre-check. Failures are classified as
    /// [`TransportError::Auth`] or [`TransportError::Connection`].
    async fn check(&self) -> Result<(), TransportError>;
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish()
    }
}

/// Syntactic validation of a recipient address.
///
/// RFC 5321/5322 grammar only, via lettre's address parser; no DNS or
/// deliverability probing. Pure and deterministic.
pub fn is_valid_address(s: &str) -> bool {
    s.parse::<Address>().is_ok()
}
