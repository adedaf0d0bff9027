use std::fmt::{self, Display};

use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id of an account owned by the external account system.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ToSql,
    FromSql,
)]
#[postgres(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        UserId(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The authenticated user sending invitations, as handed over by the
/// account system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inviter {
    pub id: UserId,
    pub username: String,
    pub email: String,
}
