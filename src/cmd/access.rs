use anyhow::Result;
use clap::Subcommand;

use crate::{
    access::{CATALOG, Tier, UsageReport},
    cmd::{CliContext, print_json},
};

#[derive(Subcommand)]
pub enum AccessCommands {
    /// List catalog features
    Catalog {
        /// Only features this tier grants
        #[arg(short, long)]
        tier: Option<Tier>,
    },

    /// Evaluate one feature for an actor
    Check {
        #[arg(short, long)]
        actor_id: String,

        #[arg(short, long)]
        feature_id: String,
    },

    /// Show an actor's usage for the current month
    Usage {
        #[arg(short, long)]
        actor_id: String,
    },
}

impl AccessCommands {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        match self {
            AccessCommands::Catalog { tier } => {
                for feature in CATALOG.iter() {
                    if tier.is_some_and(|t| !CATALOG.grants(t, feature.id)) {
                        continue;
                    }
                    println!(
                        "{:<28} {:<11} {}",
                        feature.id,
                        feature.required_tier.to_string(),
                        if feature.is_metered { "metered" } else { "" }
                    );
                }
                Ok(())
            }
            AccessCommands::Check {
                actor_id,
                feature_id,
            } => {
                let access = ctx.access_service().await?;
                let session = access.open_session(&actor_id).await;
                print_json(&session.decide(&feature_id))
            }
            AccessCommands::Usage { actor_id } => {
                let access = ctx.access_service().await?;
                let session = access.open_session(&actor_id).await;
                match session.snapshot() {
                    Some(snapshot) => print_json(&UsageReport::from(&snapshot.usage)),
                    None => Ok(()),
                }
            }
        }
    }
}
