//! Principal classification by record-id prefix.
//!
//! `GroupMember.UserOrGroupId` holds either a user or a group id. The only
//! way to tell them apart is the three-character key prefix the API encodes
//! into every id. This is tied to the upstream id encoding and will silently
//! misclassify if that encoding changes.

use xavyo_connector::types::ResourceKind;

/// Key prefix of User ids.
pub const USER_ID_PREFIX: &str = "005";

/// Key prefix of Group ids.
pub const GROUP_ID_PREFIX: &str = "00G";

const PREFIXES: &[(&str, PrincipalKind)] = &[
    (USER_ID_PREFIX, PrincipalKind::User),
    (GROUP_ID_PREFIX, PrincipalKind::Group),
];

/// Kind of a membership principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    /// Classify an id; `None` for unknown prefixes.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        PREFIXES
            .iter()
            .find(|(prefix, _)| id.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }

    #[must_use]
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            PrincipalKind::User => ResourceKind::User,
            PrincipalKind::Group => ResourceKind::Group,
        }
    }
}
