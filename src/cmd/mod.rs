pub mod access;
pub mod cache;
pub mod fees;
pub mod invite;
pub mod subscription;

use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    access::AccessService,
    cache::SnapshotCache,
    clock::{Clock, SystemClock},
    cmd::{
        access::AccessCommands, cache::CacheCommands, fees::FeeCommands,
        invite::InviteCommands, subscription::SubscriptionCommands,
    },
    db::{create_pool, repository::Repository},
    fees::{FeeSchedule, FeeService},
    invitations::InvitationService,
    utils::config::AppConfig,
};

#[derive(Parser)]
#[command(name = "edudash")]
#[command(about = "Subscription and feature access administration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Redis URL used to broadcast cache invalidations
    #[arg(long, global = true, env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Access(AccessCommands),

    /// Subscription management commands
    #[command(subcommand)]
    Subscription(SubscriptionCommands),

    /// Invitation code commands
    #[command(subcommand)]
    Invite(InviteCommands),

    /// Monthly fee commands
    #[command(subcommand)]
    Fees(FeeCommands),

    /// Snapshot cache commands
    #[command(subcommand)]
    Cache(CacheCommands),
}

impl Commands {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        match self {
            Commands::Access(cmd) => cmd.execute(ctx).await,
            Commands::Subscription(cmd) => cmd.execute(ctx).await,
            Commands::Invite(cmd) => cmd.execute(ctx).await,
            Commands::Fees(cmd) => cmd.execute(ctx).await,
            Commands::Cache(cmd) => cmd.execute(ctx).await,
        }
    }
}

/// Settings and lazily opened backends shared by every command.
pub struct CliContext {
    pub settings: AppConfig,
    pub clock: Arc<dyn Clock>,
}

impl CliContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut settings = AppConfig::from_env()?;
        if cli.database_url.is_some() {
            settings.database_url = cli.database_url.clone();
        }
        if cli.redis_url.is_some() {
            settings.redis_url = cli.redis_url.clone();
        }

        Ok(Self {
            settings,
            clock: Arc::new(SystemClock),
        })
    }

    pub async fn repository(&self) -> Result<Arc<Repository>> {
        let url = self
            .settings
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow!("DATABASE_URL must be set (or pass --database-url)"))?;
        let pool = create_pool(url, 2).await?;
        Ok(Arc::new(Repository::new(Arc::new(pool))))
    }

    pub fn redis_client(&self) -> Result<redis::Client> {
        let url = self
            .settings
            .redis_url
            .as_deref()
            .ok_or_else(|| anyhow!("REDIS_URL must be set (or pass --redis-url)"))?;
        info!("Connecting to Redis");
        Ok(redis::Client::open(url)?)
    }

    pub async fn access_service(&self) -> Result<AccessService> {
        let repo = self.repository().await?;
        Ok(AccessService::new(
            repo.clone(),
            repo,
            self.clock.clone(),
            SnapshotCache::new(Duration::from_millis(self.settings.cache_ttl_ms), 16),
        ))
    }

    pub async fn invitation_service(&self) -> Result<InvitationService> {
        Ok(InvitationService::new(
            self.repository().await?,
            self.clock.clone(),
            self.settings.invitation_expiry_days,
            self.settings.invitation_max_uses,
        ))
    }

    pub async fn fee_service(&self) -> Result<FeeService> {
        Ok(FeeService::new(
            self.repository().await?,
            self.clock.clone(),
            FeeSchedule::default(),
            self.settings.fee_due_day,
            self.settings.fee_grace_days,
        ))
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
