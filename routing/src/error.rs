use onet_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("node {0} not found in routing table")]
    NotFound(String),

    #[error("no route to {0}")]
    NoRoute(String),

    #[error("route calculation failed: {0}")]
    Calculation(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Broad failure classes, each with its own recovery procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Timeout,
    Unreachable,
    RouteCalculation,
    Other,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::RouteCalculation => "route_calculation",
            Self::Other => "other",
        }
    }
}

impl RoutingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoRoute(_) | Self::Calculation(_) => ErrorClass::RouteCalculation,
            Self::Transport(e) => ErrorClass::from(e),
            Self::NotFound(_) => ErrorClass::Other,
        }
    }
}

impl From<&TransportError> for ErrorClass {
    fn from(e: &TransportError) -> Self {
        match e {
            TransportError::Timeout(_) => ErrorClass::Timeout,
            TransportError::Unreachable(_) | TransportError::NotConnected(_) => {
                ErrorClass::Unreachable
            }
            TransportError::Rejected(_) | TransportError::Closed => ErrorClass::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(RoutingError::NoRoute("x".into()).class(), ErrorClass::RouteCalculation);
        assert_eq!(RoutingError::NotFound("x".into()).class(), ErrorClass::Other);
        assert_eq!(
            RoutingError::from(TransportError::Timeout("x".into())).class(),
            ErrorClass::Timeout
        );
        assert_eq!(
            RoutingError::from(TransportError::NotConnected("x".into())).class(),
            ErrorClass::Unreachable
        );
    }
}
