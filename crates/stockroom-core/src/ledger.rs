//! # Lot Policies
//!
//! Decides which lots a quantity is taken from or given back to. Pure
//! planning only; stockroom-db applies the plan inside its transaction.
//!
//! ## Who Uses What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operation          Direction   Lot order                              │
//! │  ─────────────────  ─────────   ─────────────────────────────────────  │
//! │  Sale               take        FIFO  (oldest entry_date first)        │
//! │  Purchase cancel    take        LIFO  (newest entry_date first)        │
//! │  Sale cancel        give back   SaleRestorePolicy                      │
//! │                                   NewestLot    → newest lot only       │
//! │                                   ConsumedLots → lots the sale drew    │
//! │                                                  from, rest to newest  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lots with equal `entry_date` are ordered by id, so plans are deterministic.
//!
//! ## Example
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use stockroom_core::ledger::{plan_draw, LotOrder, LotSlice};
//!
//! let lots = vec![
//!     LotSlice { lot_id: 1, entry_date: Utc.timestamp_opt(100, 0).unwrap(), stock_quantity: 20 },
//!     LotSlice { lot_id: 2, entry_date: Utc.timestamp_opt(200, 0).unwrap(), stock_quantity: 10 },
//! ];
//! let plan = plan_draw(&lots, LotOrder::Fifo, 25);
//! assert_eq!(plan.takes.len(), 2);
//! assert_eq!(plan.takes[0].quantity, 20);
//! assert_eq!(plan.takes[1].quantity, 5);
//! assert_eq!(plan.shortfall, 0);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// =============================================================================
// Lot Order
// =============================================================================

/// Order in which lots are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotOrder {
    /// Oldest `entry_date` first.
    Fifo,
    /// Newest `entry_date` first.
    Lifo,
}

impl LotOrder {
    /// Lot order used when a sale consumes stock.
    pub const SALE_CONSUMPTION: LotOrder = LotOrder::Fifo;
    /// Lot order used when a canceled purchase takes its stock back out.
    pub const PURCHASE_CANCEL: LotOrder = LotOrder::Lifo;

    fn compare(&self, a: &LotSlice, b: &LotSlice) -> Ordering {
        let by_age = a
            .entry_date
            .cmp(&b.entry_date)
            .then_with(|| a.lot_id.cmp(&b.lot_id));
        match self {
            LotOrder::Fifo => by_age,
            LotOrder::Lifo => by_age.reverse(),
        }
    }
}

/// The part of a lot the planner needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotSlice {
    pub lot_id: i64,
    pub entry_date: DateTime<Utc>,
    pub stock_quantity: i64,
}

/// Quantity moved to or from one lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotTake {
    pub lot_id: i64,
    pub quantity: i64,
}

/// Result of [`plan_draw`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrawPlan {
    /// In visiting order. Quantities are all positive.
    pub takes: Vec<LotTake>,
    /// Quantity no lot could cover.
    pub shortfall: i64,
}

impl DrawPlan {
    pub fn drawn(&self) -> i64 {
        self.takes.iter().map(|take| take.quantity).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.shortfall == 0
    }
}

/// Sorts lots in place according to `order`.
pub fn sort_lots(lots: &mut [LotSlice], order: LotOrder) {
    lots.sort_by(|a, b| order.compare(a, b));
}

/// Plans taking `quantity` out of `lots`.
///
/// Empty lots are skipped. Each lot gives `min(remaining, still_needed)`, so
/// no lot goes below zero. Whatever is left over is reported as `shortfall`.
pub fn plan_draw(lots: &[LotSlice], order: LotOrder, quantity: i64) -> DrawPlan {
    let mut candidates: Vec<LotSlice> = lots
        .iter()
        .filter(|lot| lot.stock_quantity > 0)
        .copied()
        .collect();
    sort_lots(&mut candidates, order);

    let mut remaining = quantity.max(0);
    let mut takes = Vec::new();

    for lot in candidates {
        if remaining == 0 {
            break;
        }
        let take = lot.stock_quantity.min(remaining);
        takes.push(LotTake {
            lot_id: lot.lot_id,
            quantity: take,
        });
        remaining -= take;
    }

    DrawPlan {
        takes,
        shortfall: remaining,
    }
}

/// Newest lot by `entry_date`, ties to the higher id. Empty lots count.
pub fn newest_lot(lots: &[LotSlice]) -> Option<&LotSlice> {
    lots.iter().min_by(|a, b| LotOrder::Lifo.compare(a, b))
}

// =============================================================================
// Sale Restore Policy
// =============================================================================

/// Where a canceled sale's quantity goes back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleRestorePolicy {
    /// Whole quantity to the single newest lot.
    #[default]
    NewestLot,
    /// Back to the lots recorded in the sale's allocations; any unrecorded
    /// remainder to the newest lot.
    ConsumedLots,
}

impl SaleRestorePolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleRestorePolicy::NewestLot => "newest_lot",
            SaleRestorePolicy::ConsumedLots => "consumed_lots",
        }
    }
}

impl fmt::Display for SaleRestorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleRestorePolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest_lot" => Ok(SaleRestorePolicy::NewestLot),
            "consumed_lots" => Ok(SaleRestorePolicy::ConsumedLots),
            other => Err(ValidationError::InvalidFormat {
                field: "sale_restore_policy".to_string(),
                reason: format!("expected newest_lot or consumed_lots, got '{}'", other),
            }),
        }
    }
}

/// Result of [`plan_restore`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestorePlan {
    pub puts: Vec<LotTake>,
    /// Quantity with no lot to go to (the inventory has no lots left).
    pub unplaced: i64,
}

/// Plans giving `quantity` back to lots.
///
/// `allocations` are the draws recorded for the sale detail, only consulted
/// under [`SaleRestorePolicy::ConsumedLots`]. Allocations pointing at lots
/// that no longer exist must be filtered out by the caller.
pub fn plan_restore(
    policy: SaleRestorePolicy,
    allocations: &[LotTake],
    newest_lot_id: Option<i64>,
    quantity: i64,
) -> RestorePlan {
    let mut remaining = quantity.max(0);
    let mut puts: Vec<LotTake> = Vec::new();

    if policy == SaleRestorePolicy::ConsumedLots {
        for allocation in allocations {
            if remaining == 0 {
                break;
            }
            let put = allocation.quantity.min(remaining);
            if put <= 0 {
                continue;
            }
            merge_put(&mut puts, allocation.lot_id, put);
            remaining -= put;
        }
    }

    if remaining > 0 {
        if let Some(lot_id) = newest_lot_id {
            merge_put(&mut puts, lot_id, remaining);
            remaining = 0;
        }
    }

    RestorePlan {
        puts,
        unplaced: remaining,
    }
}

fn merge_put(puts: &mut Vec<LotTake>, lot_id: i64, quantity: i64) {
    match puts.iter_mut().find(|put| put.lot_id == lot_id) {
        Some(existing) => existing.quantity += quantity,
        None => puts.push(LotTake { lot_id, quantity }),
    }
}

// =============================================================================
// Purchase Cancel Floor
// =============================================================================

/// What purchase cancellation does when stock has already been sold.
///
/// ```text
/// Purchase 20, sell 15, cancel purchase:
///   AllowNegative → stock_quantity_total = -15, lots clipped at 0
///   Reject        → InsufficientStock, nothing changes
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseCancelFloor {
    #[default]
    AllowNegative,
    Reject,
}

impl PurchaseCancelFloor {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PurchaseCancelFloor::AllowNegative => "allow_negative",
            PurchaseCancelFloor::Reject => "reject",
        }
    }

    /// Whether removing `quantity` from a total of `available` may proceed.
    pub const fn permits(&self, available: i64, quantity: i64) -> bool {
        match self {
            PurchaseCancelFloor::AllowNegative => true,
            PurchaseCancelFloor::Reject => available >= quantity,
        }
    }
}

impl fmt::Display for PurchaseCancelFloor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseCancelFloor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow_negative" => Ok(PurchaseCancelFloor::AllowNegative),
            "reject" => Ok(PurchaseCancelFloor::Reject),
            other => Err(ValidationError::InvalidFormat {
                field: "purchase_cancel_floor".to_string(),
                reason: format!("expected allow_negative or reject, got '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lot(lot_id: i64, day: i64, stock_quantity: i64) -> LotSlice {
        LotSlice {
            lot_id,
            entry_date: Utc.timestamp_opt(day * 86_400, 0).unwrap(),
            stock_quantity,
        }
    }

    #[test]
    fn test_fifo_takes_oldest_first() {
        // Older lot (day 1, 20 units) listed after a newer one (day 2, 10 units)
        let lots = vec![lot(2, 2, 10), lot(1, 1, 20)];
        let plan = plan_draw(&lots, LotOrder::Fifo, 25);

        assert_eq!(
            plan.takes,
            vec![
                LotTake { lot_id: 1, quantity: 20 },
                LotTake { lot_id: 2, quantity: 5 },
            ]
        );
        assert!(plan.is_complete());
        assert_eq!(plan.drawn(), 25);
    }

    #[test]
    fn test_lifo_takes_newest_first() {
        let lots = vec![lot(1, 1, 20), lot(2, 2, 10)];
        let plan = plan_draw(&lots, LotOrder::Lifo, 15);

        assert_eq!(
            plan.takes,
            vec![
                LotTake { lot_id: 2, quantity: 10 },
                LotTake { lot_id: 1, quantity: 5 },
            ]
        );
    }

    #[test]
    fn test_shortfall_is_reported_and_lots_are_clipped() {
        let lots = vec![lot(1, 1, 5), lot(2, 2, 0)];
        let plan = plan_draw(&lots, LotOrder::Lifo, 20);

        assert_eq!(plan.takes, vec![LotTake { lot_id: 1, quantity: 5 }]);
        assert_eq!(plan.shortfall, 15);
        assert!(!plan.is_complete());
    }

    #[test]
    fn test_equal_entry_dates_break_on_id() {
        let lots = vec![lot(9, 1, 1), lot(3, 1, 1)];

        let fifo = plan_draw(&lots, LotOrder::Fifo, 1);
        assert_eq!(fifo.takes[0].lot_id, 3);

        let lifo = plan_draw(&lots, LotOrder::Lifo, 1);
        assert_eq!(lifo.takes[0].lot_id, 9);

        assert_eq!(newest_lot(&lots).map(|l| l.lot_id), Some(9));
    }

    #[test]
    fn test_restore_newest_lot_ignores_allocations() {
        let allocations = [
            LotTake { lot_id: 1, quantity: 20 },
            LotTake { lot_id: 2, quantity: 5 },
        ];
        let plan = plan_restore(SaleRestorePolicy::NewestLot, &allocations, Some(2), 25);

        assert_eq!(plan.puts, vec![LotTake { lot_id: 2, quantity: 25 }]);
        assert_eq!(plan.unplaced, 0);
    }

    #[test]
    fn test_restore_consumed_lots_follows_allocations() {
        let allocations = [
            LotTake { lot_id: 1, quantity: 20 },
            LotTake { lot_id: 2, quantity: 5 },
        ];
        let plan = plan_restore(SaleRestorePolicy::ConsumedLots, &allocations, Some(2), 25);

        assert_eq!(
            plan.puts,
            vec![
                LotTake { lot_id: 1, quantity: 20 },
                LotTake { lot_id: 2, quantity: 5 },
            ]
        );
    }

    #[test]
    fn test_restore_consumed_lots_sends_remainder_to_newest() {
        let allocations = [LotTake { lot_id: 1, quantity: 4 }];
        let plan = plan_restore(SaleRestorePolicy::ConsumedLots, &allocations, Some(3), 10);

        assert_eq!(
            plan.puts,
            vec![
                LotTake { lot_id: 1, quantity: 4 },
                LotTake { lot_id: 3, quantity: 6 },
            ]
        );
    }

    #[test]
    fn test_restore_without_lots_is_unplaced() {
        let plan = plan_restore(SaleRestorePolicy::NewestLot, &[], None, 7);
        assert!(plan.puts.is_empty());
        assert_eq!(plan.unplaced, 7);
    }

    #[test]
    fn test_cancel_floor() {
        assert!(PurchaseCancelFloor::AllowNegative.permits(5, 20));
        assert!(!PurchaseCancelFloor::Reject.permits(5, 20));
        assert!(PurchaseCancelFloor::Reject.permits(20, 20));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "consumed_lots".parse::<SaleRestorePolicy>().unwrap(),
            SaleRestorePolicy::ConsumedLots
        );
        assert_eq!(
            "REJECT".parse::<PurchaseCancelFloor>().unwrap(),
            PurchaseCancelFloor::Reject
        );
        assert!("oldest".parse::<SaleRestorePolicy>().is_err());
    }
}
