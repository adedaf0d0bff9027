use chrono::Utc;
use tokio_postgres::{Client, Transaction};
use tracing::info;
use uuid::Uuid;

use invite_core::models::migrations::{
    create, delete_by_seq_order, find_one, Migration, MigrationCriteria, CREATE_MIGRATION_TABLE,
};
use invite_core::store::schema::{SCHEMA_DOWN, SCHEMA_UP};

const SEQ_ORDER: i32 = 1;
const NAME: &str = "migration_01";

const UP: &str = SCHEMA_UP;
const DOWN: &str = SCHEMA_DOWN;

async fn is_applied(trans: &Transaction<'_>) -> Result<bool, anyhow::Error> {
    let crit = vec![MigrationCriteria::SeqOrderEq(SEQ_ORDER)];
    Ok(find_one(trans)(crit).await?.is_some())
}

/// Apply migration 1 unless it is already recorded. Returns whether it ran.
pub async fn run_migration(client: &mut Client) -> Result<bool, anyhow::Error> {
    let trans = client.build_transaction().start().await?;
    trans.batch_execute(CREATE_MIGRATION_TABLE).await?;
    if is_applied(&trans).await? {
        trans.commit().await?;
        info!(name = NAME, "Migration already applied");
        return Ok(false);
    }

    // an error here drops the transaction, which rolls the tables back
    trans.batch_execute(UP).await?;
    let migration = Migration {
        id: Uuid::new_v4(),
        name: NAME.to_string(),
        seq_order: SEQ_ORDER,
        up: UP.to_string(),
        down: DOWN.to_string(),
        applied_on: Utc::now(),
    };
    create(&trans)(migration).await?;
    trans.commit().await?;
    info!(name = NAME, "Migration applied");
    Ok(true)
}

/// Revert migration 1. Returns whether there was anything to revert.
pub async fn revert_migration(client: &mut Client) -> Result<bool, anyhow::Error> {
    let trans = client.build_transaction().start().await?;
    trans.batch_execute(CREATE_MIGRATION_TABLE).await?;
    if !is_applied(&trans).await? {
        trans.commit().await?;
        info!(name = NAME, "Migration not applied, nothing to revert");
        return Ok(false);
    }

    trans.batch_execute(DOWN).await?;
    delete_by_seq_order(&trans)(SEQ_ORDER).await?;
    trans.commit().await?;
    info!(name = NAME, "Migration reverted");
    Ok(true)
}
