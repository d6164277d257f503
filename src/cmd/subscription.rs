use anyhow::Result;
use clap::Subcommand;
use tracing::{info, warn};

use crate::{
    access::{SubscriptionState, SubscriptionStatus, Tier},
    cmd::{CliContext, print_json},
    pubsub::PubSubPublisher,
};

#[derive(Subcommand)]
pub enum SubscriptionCommands {
    /// Set an actor's tier and status
    Set {
        #[arg(short, long)]
        actor_id: String,

        #[arg(short, long)]
        tier: Tier,

        #[arg(short, long, default_value = "active")]
        status: SubscriptionStatus,
    },
}

impl SubscriptionCommands {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        match self {
            SubscriptionCommands::Set {
                actor_id,
                tier,
                status,
            } => {
                let repo = ctx.repository().await?;
                let record = repo.set_subscription(&actor_id, tier, status).await?;
                info!(actor = %actor_id, %tier, %status, "Subscription updated");

                // running servers hold cached snapshots for this actor
                if ctx.settings.redis_url.is_some() {
                    let client = ctx.redis_client()?;
                    match PubSubPublisher::new(&client).await {
                        Ok(publisher) => publisher.publish_invalidate(&actor_id).await?,
                        Err(e) => warn!(error = %e, "Could not broadcast invalidation"),
                    }
                }

                print_json(&SubscriptionState::from_record(&record))
            }
        }
    }
}
