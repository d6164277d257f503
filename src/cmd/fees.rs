use anyhow::Result;
use clap::Subcommand;

use crate::{
    cmd::{CliContext, print_json},
    fees::BillingMonth,
};

#[derive(Subcommand)]
pub enum FeeCommands {
    /// Create this month's fees for every active student
    Generate {
        #[arg(short, long)]
        preschool_id: String,

        /// Billing month as YYYY-MM, defaults to the current month
        #[arg(short, long)]
        month: Option<BillingMonth>,
    },

    /// List unpaid fees past their due date
    Overdue {
        #[arg(short, long)]
        preschool_id: String,
    },
}

impl FeeCommands {
    pub async fn execute(self, ctx: &CliContext) -> Result<()> {
        let fees = ctx.fee_service().await?;

        match self {
            FeeCommands::Generate {
                preschool_id,
                month,
            } => {
                let month =
                    month.unwrap_or_else(|| BillingMonth::containing(ctx.clock.now().date_naive()));
                let report = fees.generate_monthly_fees(&preschool_id, month).await?;
                print_json(&report)
            }
            FeeCommands::Overdue { preschool_id } => {
                print_json(&fees.overdue_fees(&preschool_id).await?)
            }
        }
    }
}
