use anyhow::Result;
use clap::Subcommand;
use tracing::info;

use crate::{cmd::CliContext, pubsub::PubSubPublisher};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Tell every server to drop its cached snapshots
    Flush {
        /// Only this actor's snapshot
        #[arg(short, long)]
        actor_id: Option<String>,
    },
}

impl CacheCommands {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        match self {
            CacheCommands::Flush { actor_id } => {
                let client = ctx.redis_client()?;
                let publisher = PubSubPublisher::new(&client).await?;
                match actor_id {
                    Some(actor_id) => publisher.publish_invalidate(&actor_id).await?,
                    None => publisher.publish_invalidate_all().await?,
                }
                info!("Invalidation broadcast");
                Ok(())
            }
        }
    }
}
