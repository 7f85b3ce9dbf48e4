//! Pure approval policy
//!
//! Decides which store operations a deal needs without performing any of
//! them. The classifier executes the returned actions in order.

use super::DealStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A quota-bearing store operation required by the approval policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealAction {
    /// Write the Approved status to the stored deal
    Approve,
    /// Set the manual-approval flag on the stored deal
    FlagForManualApproval,
    /// Transform the deal into a fulfillment order
    CreateOrder,
}

/// Plan the actions for a deal with the given status and amount
///
/// Open deals below `threshold` are approved and converted; open deals at or
/// above it are flagged for manual approval. The Approved check is evaluated
/// independently of the Open branches: a deal approved in an earlier pass is
/// converted again whenever it is extracted.
///
/// # Examples
///
/// ```
/// use dealflow::deal::{plan_actions, DealAction, DealStatus};
/// use rust_decimal::Decimal;
///
/// let threshold = Decimal::new(10_000, 0);
/// assert_eq!(
///     plan_actions(DealStatus::Open, Decimal::new(5_000, 0), threshold),
///     vec![DealAction::Approve, DealAction::CreateOrder]
/// );
/// assert_eq!(
///     plan_actions(DealStatus::Approved, Decimal::new(50_000, 0), threshold),
///     vec![DealAction::CreateOrder]
/// );
/// ```
pub fn plan_actions(status: DealStatus, amount: Decimal, threshold: Decimal) -> Vec<DealAction> {
    let mut actions = Vec::with_capacity(2);

    match status {
        DealStatus::Open if amount < threshold => {
            actions.push(DealAction::Approve);
            actions.push(DealAction::CreateOrder);
        }
        DealStatus::Open => actions.push(DealAction::FlagForManualApproval),
        DealStatus::Approved | DealStatus::ClosedWon | DealStatus::ClosedLost => {}
    }

    match status {
        DealStatus::Approved => actions.push(DealAction::CreateOrder),
        DealStatus::Open | DealStatus::ClosedWon | DealStatus::ClosedLost => {}
    }

    actions
}
