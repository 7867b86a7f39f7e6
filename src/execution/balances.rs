use std::sync::Arc;

use crate::models::{BalanceSnapshot, Trader};
use crate::venue::{ExecutionVenue, VenueError};

/// Queries the venue for wallet and open-order balances and normalizes
/// them into a common quote-currency view at the current mid price.
#[derive(Clone)]
pub struct BalanceAccountant {
    venue: Arc<dyn ExecutionVenue>,
}

impl BalanceAccountant {
    pub fn new(venue: Arc<dyn ExecutionVenue>) -> Self {
        Self { venue }
    }

    /// Fetch and normalize the trader's balances.
    ///
    /// Provisions the venue holding accounts first; reading balances for
    /// accounts that do not exist yet is the one ordering hazard here.
    pub async fn snapshot(&self, trader: &Trader) -> Result<BalanceSnapshot, VenueError> {
        self.venue.ensure_accounts(trader).await?;

        let raw = self.venue.balances(trader).await?;
        let mid = self.venue.mid_price().await?;
        let snapshot = BalanceSnapshot::from_raw(&raw, mid);

        tracing::debug!(
            trader = %trader.label,
            native_gas = snapshot.native_gas,
            base_wallet = snapshot.base_wallet,
            quote_wallet = snapshot.quote_wallet,
            base_locked = snapshot.base_locked,
            quote_locked = snapshot.quote_locked,
            total_base_value = snapshot.total_base_value,
            total_quote_value = snapshot.total_quote_value,
            "balance snapshot"
        );
        Ok(snapshot)
    }
}
