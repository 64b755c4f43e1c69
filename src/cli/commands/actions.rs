//! Sale and restock commands.

use crate::cli::args::{OutputFormat, RestockArgs, SaleArgs};
use crate::error::StockflowError;
use crate::output::format_submission;
use crate::sync::{ActionPayload, RestockPayload, SalePayload};

use super::App;

/// Record a sale.
///
/// # Errors
///
/// Returns an error if the sale is invalid or cannot be stored.
pub async fn sale(app: &App, args: SaleArgs, format: OutputFormat) -> Result<String, StockflowError> {
    let payload = ActionPayload::Sale(SalePayload {
        items: args.items,
        attendant: args.actor.into(),
    });
    submit(app, payload, format).await
}

/// Record a restock.
///
/// # Errors
///
/// Returns an error if the restock is invalid or cannot be stored.
pub async fn restock(
    app: &App,
    args: RestockArgs,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    let product_name = args.name.unwrap_or_else(|| args.product_id.clone());
    let payload = ActionPayload::Restock(RestockPayload {
        product_id: args.product_id,
        product_name,
        quantity: args.quantity,
        actor: args.actor.into(),
    });
    submit(app, payload, format).await
}

async fn submit(
    app: &App,
    payload: ActionPayload,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    let description = payload.describe(app.currency_symbol());
    app.probe().await;
    let submission = app.gateway().submit(payload).await?;
    format_submission(&submission, &description, format)
}
