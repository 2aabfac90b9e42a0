use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection lifecycle of one `(tenant, connector type)` pair.
///
/// ```text
/// disconnected <-> connecting -> connected <-> error
///                       ^                        |
///                       +------------------------+
/// ```
/// `connected` and `error` can also go straight back to `disconnected`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorStatus::Disconnected => "disconnected",
            ConnectorStatus::Connecting => "connecting",
            ConnectorStatus::Connected => "connected",
            ConnectorStatus::Error => "error",
        }
    }

    pub fn can_transition(self, to: ConnectorStatus) -> bool {
        use ConnectorStatus::*;
        matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Error, Connecting)
                | (Connecting, Disconnected)
                | (Connecting, Connected)
                | (Connected, Error)
                | (Error, Connected)
                | (Connected, Disconnected)
                | (Error, Disconnected)
        )
    }
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectorStatus::*;

    #[test]
    fn legal_edges() {
        assert!(Disconnected.can_transition(Connecting));
        assert!(Connecting.can_transition(Connected));
        assert!(Connected.can_transition(Error));
        assert!(Error.can_transition(Connected));
        assert!(Error.can_transition(Disconnected));
    }

    #[test]
    fn illegal_edges() {
        assert!(!Disconnected.can_transition(Connected));
        assert!(!Disconnected.can_transition(Disconnected));
        assert!(!Connected.can_transition(Connecting));
        assert!(!Connecting.can_transition(Connecting));
        assert!(!Connecting.can_transition(Error));
    }
}
