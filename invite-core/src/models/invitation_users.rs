use std::fmt::{self, Display};

use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::postgres_common::core::entity;

use super::users::UserId;

pub const INVITATION_USER_TABLE: &str = "invitation_users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(transparent)]
pub struct InvitationUserId(pub Uuid);

entity! {
    /// Invitation quota of a single user. At most one record per inviter.
    #[derive(Debug, Clone, PartialEq)]
    pub struct InvitationUser {
        id: InvitationUserId,
        inviter: UserId,
        invitations_remaining: i32,
    }
}

impl InvitationUser {
    pub fn new(inviter: UserId, invitations_remaining: i32) -> Self {
        InvitationUser {
            id: InvitationUserId(Uuid::new_v4()),
            inviter,
            invitations_remaining,
        }
    }
}

impl Display for InvitationUser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvitationUser for {}", self.inviter)
    }
}
