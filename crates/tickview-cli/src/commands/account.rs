use tickview_core::{DepositRequest, TradeRequest};
use tracing::info;

use crate::cli::{DepositArgs, TradeArgs};
use crate::error::CliError;
use crate::output;

use super::Context;

pub async fn deposit(args: &DepositArgs, context: &Context) -> Result<(), CliError> {
    let request = DepositRequest::new(args.amount, context.config.deposit_ceiling)?;
    let snapshot = context.account.deposit(request).await?;
    info!(amount = args.amount, cash = snapshot.cash, "deposit accepted");
    output::render(&snapshot, context.pretty)
}

pub async fn trade(args: &TradeArgs, context: &Context) -> Result<(), CliError> {
    let request = TradeRequest::new(args.symbol.as_str(), args.side, args.quantity)?;
    let ack = context.account.submit_trade(request).await?;
    info!(symbol = %ack.symbol, side = %ack.side, quantity = ack.quantity, price = ack.price, "trade executed");
    output::render(&ack, context.pretty)
}
