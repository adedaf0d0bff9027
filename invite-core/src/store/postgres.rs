use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{error::SqlState, types::ToSql, Client};
use tracing::debug;

use crate::models::{
    common::field_names_without_id,
    invitation_keys::{
        InvitationKey, InvitationKeyCriteria, InvitationKeyId, INVITATION_KEY_TABLE,
    },
    invitation_users::{InvitationUser, InvitationUserCriteria, INVITATION_USER_TABLE},
    users::UserId,
};
use crate::postgres_common::core::{delete, insert, select, select_all, QueryCondition};

use super::{InvitationStore, StoreError};

const DELETE_EXPIRED_SQL: &str = "delete from invitation_keys where duration_days <> -1 \
    and created_at + make_interval(days => duration_days) <= $1";

const REDEEM_SQL: &str = "
with used as (
  update invitation_keys set uses_left = uses_left - 1
  where id = $1
    and uses_left > 0
    and not (duration_days <> -1 and created_at + make_interval(days => duration_days) <= $3)
  returning id, uses_left
), recorded as (
  insert into invitation_key_registrants (invitation_key_id, registrant_id)
  select id, $2::uuid from used
  on conflict do nothing
)
select uses_left from used";

const UPSERT_INVITATION_USER_SQL: &str = "
insert into invitation_users (id, inviter, invitations_remaining)
values ($1, $2, $3)
on conflict (inviter) do nothing";

const INSERT_KEY_CHARGED_SQL: &str = "
with charged as (
  update invitation_users set invitations_remaining = invitations_remaining - 1
  where inviter = $4
  returning invitations_remaining
), inserted as (
  insert into invitation_keys (id, key, created_at, from_user, uses_left, duration_days)
  select $1::uuid, $2::varchar, $3::timestamptz, $4::uuid, $5::int4, $6::int4 from charged
)
select invitations_remaining from charged";

const REGISTRANTS_SQL: &str = "
select registrant_id from invitation_key_registrants
where invitation_key_id = $1
order by registrant_id";

/// Store backed by the tables created in migration 1.
pub struct PgInvitationStore {
    client: Client,
}

impl PgInvitationStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<tokio_postgres::Error>()
        .and_then(|pg| pg.code())
        .map(|code| code == &SqlState::UNIQUE_VIOLATION)
        .unwrap_or(false)
}

#[async_trait]
impl InvitationStore for PgInvitationStore {
    async fn find_key_by_token(&self, token: &str) -> Result<Option<InvitationKey>, StoreError> {
        let crit = InvitationKeyCriteria::KeyEq(token.to_string());
        let cond = vec![crit.to_query_condition()];
        Ok(select(&self.client, INVITATION_KEY_TABLE, &cond, InvitationKey::from_row).await?)
    }

    async fn insert_key(&self, key: &InvitationKey) -> Result<(), StoreError> {
        let fields = field_names_without_id(InvitationKey::field_names());
        insert(
            &self.client,
            INVITATION_KEY_TABLE,
            "id",
            fields.as_slice(),
            &key.id,
            &key.to_params(),
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateKey(key.key.clone())
            } else {
                StoreError::from(e)
            }
        })
    }

    async fn find_all_keys(&self) -> Result<Vec<InvitationKey>, StoreError> {
        let cond: Vec<QueryCondition> = vec![];
        Ok(select_all(&self.client, INVITATION_KEY_TABLE, &cond, InvitationKey::from_row).await?)
    }

    async fn delete_key(&self, id: InvitationKeyId) -> Result<bool, StoreError> {
        let deleted = delete(&self.client, INVITATION_KEY_TABLE, "id", &id).await?;
        Ok(deleted > 0)
    }

    async fn delete_expired_keys(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        debug!(%now, "Deleting expired invitation keys");
        let stmt = self.client.prepare(DELETE_EXPIRED_SQL).await?;
        Ok(self.client.execute(&stmt, &[&now]).await?)
    }

    async fn find_registrants(&self, id: InvitationKeyId) -> Result<Vec<UserId>, StoreError> {
        let stmt = self.client.prepare(REGISTRANTS_SQL).await?;
        let rows = self.client.query(&stmt, &[&id]).await?;
        rows.into_iter()
            .map(|row| row.try_get("registrant_id").map_err(StoreError::from))
            .collect()
    }

    async fn redeem_key(
        &self,
        id: InvitationKeyId,
        registrant: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>, StoreError> {
        let stmt = self.client.prepare(REDEEM_SQL).await?;
        let row = self
            .client
            .query_opt(&stmt, &[&id, &registrant, &now])
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("uses_left")?)),
            None => Ok(None),
        }
    }

    async fn get_or_create_invitation_user(
        &self,
        inviter: UserId,
        default_quota: i32,
    ) -> Result<InvitationUser, StoreError> {
        let seed = InvitationUser::new(inviter, default_quota);
        let stmt = self.client.prepare(UPSERT_INVITATION_USER_SQL).await?;
        self.client
            .execute(&stmt, &[&seed.id, &seed.inviter, &seed.invitations_remaining])
            .await?;
        self.find_invitation_user(inviter).await?.ok_or_else(|| {
            StoreError::RepoError(format!("quota record for {} vanished after upsert", inviter))
        })
    }

    async fn find_invitation_user(
        &self,
        inviter: UserId,
    ) -> Result<Option<InvitationUser>, StoreError> {
        let crit = InvitationUserCriteria::InviterEq(inviter);
        let cond = vec![crit.to_query_condition()];
        Ok(select(&self.client, INVITATION_USER_TABLE, &cond, InvitationUser::from_row).await?)
    }

    async fn insert_key_charged(&self, key: &InvitationKey) -> Result<Option<i32>, StoreError> {
        let stmt = self.client.prepare(INSERT_KEY_CHARGED_SQL).await?;
        let params: [&(dyn ToSql + Sync); 6] = [
            &key.id,
            &key.key,
            &key.created_at,
            &key.from_user,
            &key.uses_left,
            &key.duration_days,
        ];
        let row = match self.client.query_opt(&stmt, &params).await {
            Ok(row) => row,
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                return Err(StoreError::DuplicateKey(key.key.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        match row {
            Some(row) => Ok(Some(row.try_get("invitations_remaining")?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde::Deserialize;
    use tokio_postgres::NoTls;

    use crate::services::tokens::generate_token;
    use crate::store::schema::SCHEMA_UP;

    use super::*;

    fn squash(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn redeem_checks_floor_and_expiry_in_the_update() {
        let sql = squash(REDEEM_SQL);
        assert!(sql.contains(
            "update invitation_keys set uses_left = uses_left - 1 \
             where id = $1 and uses_left > 0 \
             and not (duration_days <> -1 \
             and created_at + make_interval(days => duration_days) <= $3) \
             returning id, uses_left"
        ));
        assert!(sql.contains("select id, $2::uuid from used on conflict do nothing"));
        assert!(sql.ends_with("select uses_left from used"));
    }

    #[test]
    fn quota_seed_is_an_upsert_on_inviter() {
        let sql = squash(UPSERT_INVITATION_USER_SQL);
        assert_eq!(
            "insert into invitation_users (id, inviter, invitations_remaining) \
             values ($1, $2, $3) on conflict (inviter) do nothing",
            sql
        );
    }

    #[test]
    fn charged_insert_only_inserts_when_the_counter_moved() {
        let sql = squash(INSERT_KEY_CHARGED_SQL);
        assert!(sql.contains(
            "update invitation_users set invitations_remaining = invitations_remaining - 1 \
             where inviter = $4 returning invitations_remaining"
        ));
        assert!(sql.contains("$5::int4, $6::int4 from charged"));
        assert!(sql.ends_with("select invitations_remaining from charged"));
    }

    #[test]
    fn sweep_skips_keys_that_never_expire() {
        let sql = squash(DELETE_EXPIRED_SQL);
        assert_eq!(
            "delete from invitation_keys where duration_days <> -1 \
             and created_at + make_interval(days => duration_days) <= $1",
            sql
        );
    }

    #[derive(Debug, Deserialize)]
    struct DbSettings {
        db_host: String,
        db_port: String,
        db_user: String,
        db_pass: String,
        db_name: Option<String>,
    }

    async fn connect() -> PgInvitationStore {
        let db: DbSettings = envy::from_env().unwrap();
        let mut conn = format!(
            "host={} port={} user={} password={}",
            db.db_host, db.db_port, db.db_user, db.db_pass
        );
        if let Some(name) = db.db_name {
            conn.push_str(&format!(" dbname={}", name));
        }
        let (client, connection) = tokio_postgres::connect(&conn, NoTls).await.unwrap();
        tokio::spawn(async move {
            let _ = connection.await;
        });
        client.batch_execute(SCHEMA_UP).await.unwrap();
        PgInvitationStore::new(client)
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database configured through DB_*"]
    async fn statements_hold_against_postgres() {
        let store = connect().await;
        let now = Utc::now();

        let inviter = UserId::new();
        let first = store.get_or_create_invitation_user(inviter, 2).await.unwrap();
        let second = store.get_or_create_invitation_user(inviter, 9).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(2, second.invitations_remaining);

        let key = InvitationKey::new(generate_token(), inviter, 1, 7, now);
        assert_eq!(Some(1), store.insert_key_charged(&key).await.unwrap());
        assert!(matches!(
            store.insert_key_charged(&key).await,
            Err(StoreError::DuplicateKey(_))
        ));
        let record = store.find_invitation_user(inviter).await.unwrap().unwrap();
        assert_eq!(1, record.invitations_remaining);

        let orphan = InvitationKey::new(generate_token(), UserId::new(), 1, 7, now);
        assert_eq!(None, store.insert_key_charged(&orphan).await.unwrap());
        assert!(store.find_key_by_token(&orphan.key).await.unwrap().is_none());

        let registrant = UserId::new();
        assert_eq!(Some(0), store.redeem_key(key.id, registrant, now).await.unwrap());
        assert_eq!(None, store.redeem_key(key.id, UserId::new(), now).await.unwrap());
        assert_eq!(vec![registrant], store.find_registrants(key.id).await.unwrap());

        let old = InvitationKey::new(generate_token(), inviter, 3, 7, now - Duration::days(10));
        store.insert_key(&old).await.unwrap();
        assert_eq!(None, store.redeem_key(old.id, UserId::new(), now).await.unwrap());
        assert!(store.delete_expired_keys(now).await.unwrap() >= 1);
        assert!(store.find_key_by_token(&old.key).await.unwrap().is_none());
        assert!(store.find_key_by_token(&key.key).await.unwrap().is_some());

        assert!(store.delete_key(key.id).await.unwrap());
        assert!(store.find_registrants(key.id).await.unwrap().is_empty());
    }
}
