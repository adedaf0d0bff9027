use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio_postgres::Transaction;
use uuid::Uuid;

use crate::postgres_common::core::{entity, insert, select};

use super::common::field_names_without_id;

pub const MIGRATION_TABLE: &str = "migrations";

pub const CREATE_MIGRATION_TABLE: &str = "
create table if not exists migrations (
  id uuid not null primary key,
  name varchar(255) not null,
  seq_order integer not null unique,
  up text not null,
  down text not null,
  applied_on timestamptz not null default current_timestamp
);";

entity! {
  #[derive(Debug)]
  pub struct Migration {
    id: Uuid,
    name: String,
    seq_order: i32,
    up: String,
    down: String,
    applied_on: DateTime<Utc>,
  }
}

pub fn find_one<'a>(
    client: &'a Transaction<'a>,
) -> impl FnOnce(Vec<MigrationCriteria>) -> BoxFuture<'a, Result<Option<Migration>, anyhow::Error>>
{
    move |crit: Vec<MigrationCriteria>| {
        Box::pin(async move {
            let cond: Vec<_> = crit.iter().map(|x| x.to_query_condition()).collect();
            select(client, MIGRATION_TABLE, &cond, Migration::from_row).await
        })
    }
}

pub fn create<'a>(
    client: &'a Transaction<'a>,
) -> impl FnOnce(Migration) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |migration: Migration| {
        Box::pin(async move {
            let fields = field_names_without_id(Migration::field_names());
            insert(
                client,
                MIGRATION_TABLE,
                "id",
                fields.as_slice(),
                &migration.id,
                &migration.to_params(),
            )
            .await
        })
    }
}

pub fn delete_by_seq_order<'a>(
    client: &'a Transaction<'a>,
) -> impl FnOnce(i32) -> BoxFuture<'a, Result<u64, anyhow::Error>> {
    move |seq_order: i32| {
        Box::pin(async move {
            let stmt = client
                .prepare("delete from migrations where seq_order = $1")
                .await?;
            Ok(client.execute(&stmt, &[&seq_order]).await?)
        })
    }
}
