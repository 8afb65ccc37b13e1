use std::fmt::{Display, Formatter};

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
/// The part a node plays in the cluster.
///
/// The role is broadcast to other members as a single metadata byte and
/// stays fixed for the lifetime of the node.
pub enum Role {
    #[default]
    /// The node did not advertise a role we understand.
    Unknown = 0,
    /// The node owns a partition of the ring and receives routed messages.
    RingMember = 1,
    /// The node observes the cluster but never owns any keys, i.e. a gateway.
    Watcher = 2,
}

impl Role {
    #[inline]
    /// The single metadata byte describing the role.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decodes the role from the value stored in the gossip state.
    pub(crate) fn from_state_value(value: &str) -> Self {
        value.parse::<u8>().map(Self::from).unwrap_or_default()
    }

    /// Encodes the role into a value which can be stored in the gossip state.
    pub(crate) fn to_state_value(self) -> String {
        self.as_byte().to_string()
    }
}

impl From<u8> for Role {
    fn from(value: u8) -> Self {
        match value {
            1 => Role::RingMember,
            2 => Role::Watcher,
            _ => Role::Unknown,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Unknown => write!(f, "unknown"),
            Role::RingMember => write!(f, "ring-member"),
            Role::Watcher => write!(f, "watcher"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_byte() {
        assert_eq!(Role::from(0), Role::Unknown);
        assert_eq!(Role::from(1), Role::RingMember);
        assert_eq!(Role::from(2), Role::Watcher);
        assert_eq!(Role::from(42), Role::Unknown);
    }

    #[test]
    fn test_state_value() {
        for role in [Role::Unknown, Role::RingMember, Role::Watcher] {
            assert_eq!(Role::from_state_value(&role.to_state_value()), role);
        }
        assert_eq!(Role::from_state_value("garbage"), Role::Unknown);
        assert_eq!(Role::from_state_value("300"), Role::Unknown);
    }
}
