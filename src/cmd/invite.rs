use anyhow::Result;
use clap::Subcommand;
use tracing::info;

use crate::{
    cmd::{CliContext, print_json},
    invitations::{InviteRole, NewInvitation},
};

#[derive(Subcommand)]
pub enum InviteCommands {
    /// Issue an invitation code
    Create {
        #[arg(short, long)]
        preschool_id: String,

        /// Profile id of the issuing principal
        #[arg(short, long)]
        invited_by: String,

        #[arg(short, long)]
        role: InviteRole,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        max_uses: Option<u32>,

        #[arg(long)]
        expires_in_days: Option<i64>,
    },

    /// Show a code and whether it can still be redeemed
    Show {
        #[arg(short, long)]
        code: String,
    },

    /// Revoke a code
    Revoke {
        #[arg(short, long)]
        code: String,
    },
}

impl InviteCommands {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let invitations = ctx.invitation_service().await?;

        match self {
            InviteCommands::Create {
                preschool_id,
                invited_by,
                role,
                email,
                max_uses,
                expires_in_days,
            } => {
                let invitation = invitations
                    .create(NewInvitation {
                        preschool_id,
                        invited_by,
                        role,
                        email,
                        max_uses,
                        expires_in_days,
                    })
                    .await?;
                print_json(&invitation)
            }
            InviteCommands::Show { code } => {
                let invitation = invitations.lookup(&code).await?;
                match invitation.check(ctx.clock.now()) {
                    Ok(()) => info!(remaining = invitation.remaining_uses(), "Code is valid"),
                    Err(e) => info!(reason = %e, "Code cannot be redeemed"),
                }
                print_json(&invitation)
            }
            InviteCommands::Revoke { code } => {
                invitations.revoke(&code).await?;
                info!(%code, "Revoked");
                Ok(())
            }
        }
    }
}
