use std::fmt::{self, Display};

use chrono::{DateTime, Duration, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::postgres_common::core::entity;

use super::users::UserId;

pub const INVITATION_KEY_TABLE: &str = "invitation_keys";

/// Duration marker for keys that never expire.
pub const NEVER_EXPIRES: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(transparent)]
pub struct InvitationKeyId(pub Uuid);

impl Display for InvitationKeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

entity! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct InvitationKey {
        id: InvitationKeyId,
        key: String,
        created_at: DateTime<Utc>,
        from_user: UserId,
        uses_left: i32,
        duration_days: i32,
    }
}

/// Where a key stands at a given instant. Expiry wins over exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Usable,
    Expired,
    Exhausted,
}

impl InvitationKey {
    pub fn new(
        key: String,
        from_user: UserId,
        uses_left: i32,
        duration_days: i32,
        now: DateTime<Utc>,
    ) -> Self {
        InvitationKey {
            id: InvitationKeyId(Uuid::new_v4()),
            key,
            created_at: now,
            from_user,
            uses_left,
            duration_days,
        }
    }

    /// Instant from which the key counts as expired, `None` when it never
    /// expires. Saturates at the latest representable instant.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.duration_days == NEVER_EXPIRES {
            return None;
        }
        Some(
            self.created_at
                .checked_add_signed(Duration::days(i64::from(self.duration_days)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => expiry <= now,
            None => false,
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.uses_left > 0 && !self.is_expired(now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> KeyState {
        if self.is_expired(now) {
            KeyState::Expired
        } else if self.uses_left <= 0 {
            KeyState::Exhausted
        } else {
            KeyState::Usable
        }
    }

    pub fn expiry_date_display(&self) -> String {
        match self.expires_at() {
            Some(expiry) => expiry.format("%d %b %Y %H:%M").to_string(),
            None => "never".to_string(),
        }
    }
}

impl Display for InvitationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Invitation from {} on {} ({})",
            self.from_user, self.created_at, self.key
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn key_with(uses_left: i32, duration_days: i32) -> InvitationKey {
        InvitationKey::new(
            "0123456789abcdef0123456789abcdef01234567".to_string(),
            UserId::new(),
            uses_left,
            duration_days,
            created(),
        )
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let key = key_with(1, 7);
        let boundary = created() + Duration::days(7);
        assert!(!key.is_expired(boundary - Duration::seconds(1)));
        assert!(key.is_expired(boundary));
        assert!(key.is_expired(boundary + Duration::days(365)));
    }

    #[test]
    fn never_expiring_key_stays_usable() {
        let key = key_with(1, NEVER_EXPIRES);
        for years in [0i64, 1, 50, 5000] {
            let later = created() + Duration::days(365 * years);
            assert!(!key.is_expired(later));
            assert!(key.is_usable(later));
        }
        assert_eq!("never", key.expiry_date_display());
    }

    #[test]
    fn zero_day_key_expires_at_creation() {
        let key = key_with(1, 0);
        assert!(key.is_expired(created()));
        assert!(!key.is_usable(created()));
    }

    #[test]
    fn usable_needs_uses_and_time() {
        let now = created() + Duration::days(1);
        for uses in [-1, 0, 1, 5] {
            for duration in [NEVER_EXPIRES, 0, 1, 7] {
                let key = key_with(uses, duration);
                assert_eq!(
                    uses > 0 && !key.is_expired(now),
                    key.is_usable(now),
                    "uses {} duration {}",
                    uses,
                    duration
                );
            }
        }
    }

    #[test]
    fn state_prefers_expired_over_exhausted() {
        let key = key_with(0, 1);
        assert_eq!(KeyState::Exhausted, key.state(created()));
        assert_eq!(KeyState::Expired, key.state(created() + Duration::days(2)));
        assert_eq!(KeyState::Usable, key_with(1, 1).state(created()));
    }

    #[test]
    fn huge_duration_saturates_instead_of_never_expiring() {
        let key = key_with(1, i32::MAX);
        assert_eq!(Some(DateTime::<Utc>::MAX_UTC), key.expires_at());
        assert!(key.is_expired(DateTime::<Utc>::MAX_UTC));
        assert!(!key.is_expired(created() + Duration::days(365 * 1000)));
        assert_ne!("never", key.expiry_date_display());
    }

    #[test]
    fn expiry_date_is_formatted() {
        assert_eq!("08 Mar 2024 12:00", key_with(1, 7).expiry_date_display());
    }

    #[test]
    fn display_names_issuer_and_token() {
        let key = key_with(1, 7);
        let shown = key.to_string();
        assert!(shown.starts_with(&format!("Invitation from {} on ", key.from_user)));
        assert!(shown.ends_with("(0123456789abcdef0123456789abcdef01234567)"));
    }
}
