use std::error::Error as StdError;

/// Crate-wide result type for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Relay failures. None of these ever reach host code: every path that
/// produces one ends in a log line and a dropped message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No route for the channel or external ID. Expected and frequent.
    #[error("no route for {direction} channel {key}")]
    RouteNotFound {
        direction: &'static str,
        key: String,
    },

    /// A delivery attempt failed (transport error or non-success status).
    #[error("delivery failed: {message}")]
    NetworkFailure {
        status: Option<u16>,
        message: String,
    },

    /// Message could not be constructed (empty body, malformed packet, ...).
    #[error("invalid relay input: {message}")]
    InvalidInput { message: String },

    /// The gateway session could not be established.
    #[error("gateway connection failed: {message}")]
    ConnectionFailure { message: String },

    /// Wrapped source error from an external dependency.
    #[error("relay operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn outbound_route(channel: impl Into<String>) -> Self {
        Self::RouteNotFound {
            direction: "outbound",
            key: channel.into(),
        }
    }

    #[must_use]
    pub fn inbound_route(external_id: impl Into<String>) -> Self {
        Self::RouteNotFound {
            direction: "inbound",
            key: external_id.into(),
        }
    }

    #[must_use]
    pub fn network(status: Option<u16>, message: impl std::fmt::Display) -> Self {
        Self::NetworkFailure {
            status,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn connection(message: impl std::fmt::Display) -> Self {
        Self::ConnectionFailure {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_miss_messages() {
        let err = Error::outbound_route("guild");
        assert_eq!(err.to_string(), "no route for outbound channel guild");
        assert_eq!(
            Error::inbound_route("999").to_string(),
            "no route for inbound channel 999"
        );
    }

    #[test]
    fn network_failure_keeps_status() {
        let err = Error::network(Some(404), "Unknown Webhook");
        assert!(matches!(err, Error::NetworkFailure {
            status: Some(404),
            ..
        }));
        assert_eq!(err.to_string(), "delivery failed: Unknown Webhook");
    }
}
