mod migrations;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};
use uuid::Uuid;

use invite_core::config::InvitationConfig;
use invite_core::mail::{LogMailer, Mailer, SmtpMailer, SmtpSettings};
use invite_core::models::users::UserId;
use invite_core::services::InvitationService;
use invite_core::store::PgInvitationStore;
use invite_core::templates::BuiltinTemplates;

use crate::migrations::run_migrations::{run_migrations_down, run_migrations_up};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Write logs as JSON lines
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    op: Op,
}

#[derive(Subcommand, Debug)]
enum Op {
    /// Apply pending schema migrations
    Migrate,
    /// Revert the invitation schema
    MigrateDown,
    /// Delete expired invitation keys
    Sweep,
    /// Create a multi-use invitation key
    Bulk {
        #[clap(long)]
        user: Uuid,
        #[clap(long)]
        token: String,
        #[clap(long)]
        uses: i32,
    },
    /// Create the bulk invitations listed in a YAML file
    BulkFile { path: String },
    /// Show how many invitations a user has left
    Quota {
        #[clap(long)]
        user: Uuid,
    },
    /// List every invitation key
    ListKeys,
    /// Delete an invitation key
    Revoke { token: String },
}

#[derive(Debug, Deserialize)]
pub struct YamlBulkInvitation {
    pub user: Uuid,
    pub token: String,
    pub uses: i32,
}

#[derive(Deserialize, Debug)]
pub struct EnvConfig {
    pub db_host: String,
    pub db_port: String,
    pub db_user: String,
    pub db_pass: String,
    pub db_name: Option<String>,
}

impl EnvConfig {
    fn connection_string(&self) -> String {
        let mut conn = format!(
            "host={} port={} user={} password={}",
            self.db_host, self.db_port, self.db_user, self.db_pass
        );
        if let Some(name) = &self.db_name {
            conn.push_str(&format!(" dbname={}", name));
        }
        conn
    }
}

fn init_logging(json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

async fn connect(env: &EnvConfig) -> Result<Client, anyhow::Error> {
    let (client, connection) = tokio_postgres::connect(&env.connection_string(), NoTls)
        .await
        .context("could not connect to the database")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "Database connection error");
        }
    });
    Ok(client)
}

fn mailer() -> Result<Arc<dyn Mailer>, anyhow::Error> {
    if std::env::var_os("SMTP_HOST").is_none() {
        info!("SMTP_HOST not set, mail goes to the log");
        return Ok(Arc::new(LogMailer));
    }
    let settings: SmtpSettings = envy::prefixed("SMTP_")
        .from_env()
        .context("invalid SMTP settings")?;
    Ok(Arc::new(SmtpMailer::new(settings)?))
}

fn service(client: Client) -> Result<InvitationService, anyhow::Error> {
    let config = InvitationConfig::from_env()?;
    Ok(InvitationService::new(
        Arc::new(PgInvitationStore::new(client)),
        mailer()?,
        Arc::new(BuiltinTemplates),
        config,
    ))
}

async fn create_bulk(
    service: &InvitationService,
    user: Uuid,
    token: &str,
    uses: i32,
) -> Result<(), anyhow::Error> {
    let key = service
        .create_bulk_invitation(UserId(user), token, uses)
        .await?;
    println!("{}\t{} uses\texpires {}", key.key, key.uses_left, key.expiry_date_display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging(args.json);

    let env: EnvConfig = envy::from_env().context("missing database settings")?;
    let mut client = connect(&env).await?;

    match args.op {
        Op::Migrate => {
            let applied = run_migrations_up(&mut client).await?;
            println!("{} migration(s) applied", applied);
        }
        Op::MigrateDown => {
            let reverted = run_migrations_down(&mut client).await?;
            println!("{} migration(s) reverted", reverted);
        }
        Op::Sweep => {
            let deleted = service(client)?.delete_expired_keys().await?;
            println!("{} expired key(s) deleted", deleted);
        }
        Op::Bulk { user, token, uses } => {
            create_bulk(&service(client)?, user, &token, uses).await?;
        }
        Op::BulkFile { path } => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("could not open {}", path))?;
            let entries: Vec<YamlBulkInvitation> = serde_yaml::from_reader(file)?;
            let service = service(client)?;
            for entry in entries {
                create_bulk(&service, entry.user, &entry.token, entry.uses).await?;
            }
        }
        Op::Quota { user } => {
            let remaining = service(client)?
                .remaining_invitations_for(UserId(user))
                .await?;
            println!("{}", remaining);
        }
        Op::ListKeys => {
            let service = service(client)?;
            let now = service.now();
            for key in service.list_keys().await? {
                println!(
                    "{}\t{}\texpired={}\tuses_left={}",
                    key,
                    key.expiry_date_display(),
                    key.is_expired(now),
                    key.uses_left
                );
            }
        }
        Op::Revoke { token } => {
            if service(client)?.revoke_key(&token).await? {
                println!("revoked {}", token);
            } else {
                println!("no invitation key {}", token);
            }
        }
    }
    Ok(())
}
