use tokio_postgres::Client;

use super::migration_01;

/// Apply every pending migration in order. Returns how many ran.
pub async fn run_migrations_up(client: &mut Client) -> Result<usize, anyhow::Error> {
    let mut applied = 0;
    if migration_01::run_migration(client).await? {
        applied += 1;
    }
    Ok(applied)
}

/// Revert migrations newest first. Returns how many were reverted.
pub async fn run_migrations_down(client: &mut Client) -> Result<usize, anyhow::Error> {
    let mut reverted = 0;
    if migration_01::revert_migration(client).await? {
        reverted += 1;
    }
    Ok(reverted)
}
