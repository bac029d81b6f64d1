//! SMTP transport implementation backed by lettre.
//!
//! Built without connection pooling on purpose: every [`Transport::submit`]
//! call is a complete connect / authenticate / submit / quit cycle, which
//! keeps one record's session failure fully isolated from the next
//! attempt's.

use crate::config::{SmtpSettings, TlsMode};
use crate::error::{ConfigError, TransportError};
use crate::transport::Transport;
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Real SMTP transport for production use.
pub struct SmtpSender {
    inner: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpSender {
    /// Build a transport from resolved settings.
    ///
    /// # Errors
    /// Returns [`ConfigError::ValidationError`] if the TLS parameters
    /// cannot be constructed for the configured host.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, ConfigError> {
        let host = &settings.host;

        let tls_parameters = if settings.tls != TlsMode::None {
            let mut tls_builder = TlsParameters::builder(host.clone());
            if !settings.tls_verify {
                // Self-signed relay certificates on internal networks.
                tls_builder = tls_builder.dangerous_accept_invalid_certs(true);
            }
            Some(tls_builder.build().map_err(|e| {
                ConfigError::ValidationError(format!("TLS configuration error: {}", e))
            })?)
        } else {
            None
        };

        let builder = match settings.tls {
            TlsMode::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(settings.port)
            }
            TlsMode::Starttls => {
                let tls_params = tls_parameters.expect("TLS parameters required for STARTTLS");
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .port(settings.port)
                    .tls(Tls::Required(tls_params))
            }
            TlsMode::Tls => {
                let tls_params = tls_parameters.expect("TLS parameters required for TLS");
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .port(settings.port)
                    .tls(Tls::Wrapper(tls_params))
            }
        };

        let builder = builder.timeout(Some(settings.timeout));

        // Both-or-neither is enforced by config validation.
        let builder = match (&settings.username, &settings.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(
                user.clone(),
                pass.expose().to_string(),
            )),
            _ => builder,
        };

        Ok(Self {
            inner: builder.build(),
            host: host.clone(),
        })
    }
}

#[async_trait]
impl Transport for SmtpSender {
    async fn submit(&self, message: Message) -> Result<(), TransportError> {
        match self.inner.send(message).await {
            Ok(response) => {
                tracing::trace!(code = %response.code(), "Relay accepted message");
                Ok(())
            }
            Err(e) => {
                let detail = e.to_string();
                if is_auth_failure(&detail) {
                    Err(TransportError::Auth(detail))
                } else {
                    Err(TransportError::Submit(detail))
                }
            }
        }
    }

    async fn check(&self) -> Result<(), TransportError> {
        match self.inner.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::Connection(format!(
                "relay {} rejected the session probe",
                self.host
            ))),
            Err(e) => {
                let detail = e.to_string();
                if is_auth_failure(&detail) {
                    Err(TransportError::Auth(detail))
                } else {
                    Err(TransportError::Connection(detail))
                }
            }
        }
    }
}

impl std::fmt::Debug for SmtpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose credentials in debug output.
        f.debug_struct("SmtpSender").field("host", &self.host).finish()
    }
}

/// Check whether a relay error indicates rejected credentials.
///
/// Uses word boundary matching so an SMTP code appearing inside an email
/// address or message id is not a false positive.
pub(crate) fn is_auth_failure(error_str: &str) -> bool {
    let contains_smtp_code = |code: &str| {
        error_str
            .split(|c: char| !c.is_ascii_digit())
            .any(|segment| segment == code)
    };

    let lowered = error_str.to_lowercase();
    lowered.contains("authentication")
        || lowered.contains("invalid credentials")
        || contains_smtp_code("535") // Authentication credentials invalid
        || contains_smtp_code("534") // Stronger authentication required
        || contains_smtp_code("530") // Authentication required
}
