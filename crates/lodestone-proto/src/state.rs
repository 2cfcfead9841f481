//! Protocol states and handshake intent.

use std::fmt;

use crate::errors::ProtocolError;

/// Protocol phase of a connection. Gates which packets are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    /// Connection just opened, waiting for the handshake
    Handshaking,
    /// Server list query (status request + ping)
    Status,
    /// Login in progress
    Login,
    /// Fully joined
    Play,
}

impl ProtocolState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Transitions are one directional: Handshaking to Status or Login, and
    /// Login to Play. No state is ever revisited.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Handshaking, Self::Status | Self::Login) | (Self::Login, Self::Play)
        )
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshaking => "handshaking",
            Self::Status => "status",
            Self::Login => "login",
            Self::Play => "play",
        };
        f.write_str(name)
    }
}

/// State requested by the handshake's `next_state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NextState {
    /// Status query (wire value 1)
    Status,
    /// Login (wire value 2)
    Login,
}

impl NextState {
    /// Wire value of this intent.
    pub fn to_i32(self) -> i32 {
        match self {
            Self::Status => 1,
            Self::Login => 2,
        }
    }

    /// Protocol state the connection enters after the handshake.
    pub fn protocol_state(self) -> ProtocolState {
        match self {
            Self::Status => ProtocolState::Status,
            Self::Login => ProtocolState::Login,
        }
    }
}

impl TryFrom<i32> for NextState {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Status),
            2 => Ok(Self::Login),
            other => Err(ProtocolError::InvalidNextState(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ProtocolState; 4] = [
        ProtocolState::Handshaking,
        ProtocolState::Status,
        ProtocolState::Login,
        ProtocolState::Play,
    ];

    #[test]
    fn only_forward_transitions_are_legal() {
        let legal: Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(legal, vec![
            (ProtocolState::Handshaking, ProtocolState::Status),
            (ProtocolState::Handshaking, ProtocolState::Login),
            (ProtocolState::Login, ProtocolState::Play),
        ]);
    }

    #[test]
    fn next_state_rejects_unknown_values() {
        assert_eq!(NextState::try_from(1), Ok(NextState::Status));
        assert_eq!(NextState::try_from(2), Ok(NextState::Login));
        assert_eq!(NextState::try_from(0), Err(ProtocolError::InvalidNextState(0)));
        assert_eq!(NextState::try_from(3), Err(ProtocolError::InvalidNextState(3)));
    }
}
