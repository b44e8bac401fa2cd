//! Splitting a table's bill between comensales.
//!
//! A [`SplitSession`] starts from the closed order and the number of
//! comensales and works in exactly one [`SplitMode`] at a time:
//!
//! - `Items`: concrete item quantities are assigned to each split. A split
//!   is charged `item.total / item.quantity` per unit, so discounts baked
//!   into the line total are spread evenly over its units.
//! - `Equal`: every split pays `total / N`.
//! - `Custom`: free amounts per split that must add up to the total within
//!   one currency unit.
//!
//! Switching modes discards all work done in the previous mode. Nothing is
//! persisted; the confirmed splits are handed to [`SplitPaymentSelector`].

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use crate::models::SaleItem;

pub type SplitId = usize;

/// Allowed gap between the custom amounts and the order total.
pub const CUSTOM_TOLERANCE: f64 = 1.0;

#[derive(Error, Debug, PartialEq)]
pub enum SplitError {
    #[error("at least one comensal is required")]
    NoComensales,

    #[error("unknown item: {0}")]
    UnknownItem(i64),

    #[error("unknown split: {0}")]
    UnknownSplit(SplitId),

    #[error("operation requires {expected} mode")]
    WrongMode { expected: &'static str },

    #[error("item {item_id} still has {remaining} unassigned unit(s)")]
    Unassigned { item_id: i64, remaining: i64 },

    #[error("split amounts add up to {sum:.2}, order total is {total:.2}")]
    AmountMismatch { sum: f64, total: f64 },

    #[error("split {0} must have an amount greater than zero")]
    NonPositiveAmount(SplitId),

    #[error("split {0} has nothing to pay")]
    NothingToPay(SplitId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitItem {
    pub item_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillSplit {
    pub id: SplitId,
    pub name: String,
    pub items: Vec<SplitItem>,
    pub total: f64,
}

/// Per item, the quantity given to each split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemAssignments {
    assigned: HashMap<i64, BTreeMap<SplitId, i64>>,
}

impl ItemAssignments {
    pub fn assigned_to(&self, item_id: i64, split: SplitId) -> i64 {
        self.assigned
            .get(&item_id)
            .and_then(|m| m.get(&split))
            .copied()
            .unwrap_or(0)
    }

    pub fn assigned_total(&self, item_id: i64) -> i64 {
        self.assigned
            .get(&item_id)
            .map(|m| m.values().sum())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitMode {
    Items(ItemAssignments),
    Equal,
    Custom(Vec<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitModeKind {
    Items,
    Equal,
    Custom,
}

impl SplitMode {
    pub fn kind(&self) -> SplitModeKind {
        match self {
            Self::Items(_) => SplitModeKind::Items,
            Self::Equal => SplitModeKind::Equal,
            Self::Custom(_) => SplitModeKind::Custom,
        }
    }
}

/// Equal shares rounded down to the cent; the last share takes the remainder
/// so the shares add up to `total` exactly in cents.
pub fn distribute_evenly(total: f64, comensales: usize) -> Vec<f64> {
    if comensales == 0 {
        return Vec::new();
    }
    let total_cents = (total * 100.0).round() as i64;
    let n = comensales as i64;
    let per = total_cents.div_euclid(n);
    let last = total_cents - per * (n - 1);
    let mut out = vec![per as f64 / 100.0; comensales - 1];
    out.push(last as f64 / 100.0);
    out
}

#[derive(Debug, Clone)]
pub struct SplitSession {
    items: Vec<SaleItem>,
    total: f64,
    names: Vec<String>,
    mode: SplitMode,
}

impl SplitSession {
    pub fn new(items: Vec<SaleItem>, total: f64, comensales: usize) -> Result<Self, SplitError> {
        if comensales == 0 {
            return Err(SplitError::NoComensales);
        }
        let names = (1..=comensales).map(|i| format!("Comensal {i}")).collect();
        Ok(Self {
            items,
            total,
            names,
            mode: SplitMode::Items(ItemAssignments::default()),
        })
    }

    pub fn comensales(&self) -> usize {
        self.names.len()
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn items(&self) -> &[SaleItem] {
        &self.items
    }

    pub fn mode(&self) -> &SplitMode {
        &self.mode
    }

    pub fn rename(&mut self, split: SplitId, name: &str) -> Result<(), SplitError> {
        let slot = self.names.get_mut(split).ok_or(SplitError::UnknownSplit(split))?;
        *slot = name.to_string();
        Ok(())
    }

    /// Switch mode. All assignments and amounts are reset.
    pub fn set_mode(&mut self, kind: SplitModeKind) {
        self.mode = match kind {
            SplitModeKind::Items => SplitMode::Items(ItemAssignments::default()),
            SplitModeKind::Equal => SplitMode::Equal,
            SplitModeKind::Custom => SplitMode::Custom(vec![0.0; self.names.len()]),
        };
    }

    fn check_split(&self, split: SplitId) -> Result<(), SplitError> {
        if split >= self.names.len() {
            return Err(SplitError::UnknownSplit(split));
        }
        Ok(())
    }

    fn item(&self, item_id: i64) -> Result<&SaleItem, SplitError> {
        self.items
            .iter()
            .find(|i| i.id == item_id)
            .ok_or(SplitError::UnknownItem(item_id))
    }

    /// Units of the item not yet given to any split.
    pub fn remaining(&self, item_id: i64) -> Result<i64, SplitError> {
        let item = self.item(item_id)?;
        let assigned = match &self.mode {
            SplitMode::Items(a) => a.assigned_total(item_id),
            _ => 0,
        };
        Ok(item.quantity - assigned)
    }

    /// Give `quantity` units of an item to a split, replacing what that split
    /// had. Requests beyond what the other splits left are truncated; the
    /// quantity actually assigned is returned.
    pub fn assign(&mut self, item_id: i64, split: SplitId, quantity: i64) -> Result<i64, SplitError> {
        self.check_split(split)?;
        let item_quantity = self.item(item_id)?.quantity;
        let SplitMode::Items(assignments) = &mut self.mode else {
            return Err(SplitError::WrongMode { expected: "items" });
        };

        let per_split = assignments.assigned.entry(item_id).or_default();
        let others: i64 = per_split
            .iter()
            .filter(|(s, _)| **s != split)
            .map(|(_, q)| *q)
            .sum();
        let granted = quantity.clamp(0, (item_quantity - others).max(0));
        if granted == 0 {
            per_split.remove(&split);
        } else {
            per_split.insert(split, granted);
        }
        Ok(granted)
    }

    pub fn set_amount(&mut self, split: SplitId, amount: f64) -> Result<(), SplitError> {
        self.check_split(split)?;
        let SplitMode::Custom(amounts) = &mut self.mode else {
            return Err(SplitError::WrongMode { expected: "custom" });
        };
        amounts[split] = amount;
        Ok(())
    }

    /// Seed the custom amounts with an even distribution.
    pub fn distribute_evenly(&mut self) -> Result<(), SplitError> {
        let seeded = distribute_evenly(self.total, self.names.len());
        let SplitMode::Custom(amounts) = &mut self.mode else {
            return Err(SplitError::WrongMode { expected: "custom" });
        };
        *amounts = seeded;
        Ok(())
    }

    pub fn splits(&self) -> Vec<BillSplit> {
        let n = self.names.len();
        self.names
            .iter()
            .enumerate()
            .map(|(id, name)| {
                let (items, total) = match &self.mode {
                    SplitMode::Items(assignments) => {
                        let items: Vec<SplitItem> = self
                            .items
                            .iter()
                            .filter_map(|item| {
                                let qty = assignments.assigned_to(item.id, id);
                                if qty == 0 || item.quantity == 0 {
                                    return None;
                                }
                                Some(SplitItem {
                                    item_id: item.id,
                                    product_name: item.product_name.clone(),
                                    quantity: qty,
                                    amount: item.total / item.quantity as f64 * qty as f64,
                                })
                            })
                            .collect();
                        let total = items.iter().map(|i| i.amount).sum();
                        (items, total)
                    }
                    SplitMode::Equal => (Vec::new(), self.total / n as f64),
                    SplitMode::Custom(amounts) => (Vec::new(), amounts[id]),
                };
                BillSplit {
                    id,
                    name: name.clone(),
                    items,
                    total,
                }
            })
            .collect()
    }

    /// First reason the current state cannot be confirmed, if any.
    pub fn validate(&self) -> Result<(), SplitError> {
        match &self.mode {
            SplitMode::Items(assignments) => {
                for item in &self.items {
                    let remaining = item.quantity - assignments.assigned_total(item.id);
                    if remaining != 0 {
                        return Err(SplitError::Unassigned {
                            item_id: item.id,
                            remaining,
                        });
                    }
                }
                Ok(())
            }
            SplitMode::Equal => Ok(()),
            SplitMode::Custom(amounts) => {
                if let Some(bad) = amounts.iter().position(|a| !(*a > 0.0)) {
                    return Err(SplitError::NonPositiveAmount(bad));
                }
                let sum: f64 = amounts.iter().sum();
                if (sum - self.total).abs() >= CUSTOM_TOLERANCE {
                    return Err(SplitError::AmountMismatch {
                        sum,
                        total: self.total,
                    });
                }
                Ok(())
            }
        }
    }

    pub fn can_confirm(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn confirm(&self) -> Result<Vec<BillSplit>, SplitError> {
        self.validate()?;
        Ok(self.splits())
    }
}

/// Tracks which confirmed splits have been paid. Payment itself happens
/// elsewhere; the caller reports it with [`SplitPaymentSelector::mark_paid`].
#[derive(Debug, Clone)]
pub struct SplitPaymentSelector {
    splits: Vec<BillSplit>,
    paid: HashSet<SplitId>,
}

impl SplitPaymentSelector {
    pub fn new(splits: Vec<BillSplit>, paid: HashSet<SplitId>) -> Self {
        Self { splits, paid }
    }

    /// Splits that have something to pay.
    pub fn payable(&self) -> impl Iterator<Item = &BillSplit> {
        self.splits.iter().filter(|s| s.total > 0.0)
    }

    pub fn is_paid(&self, id: SplitId) -> bool {
        self.paid.contains(&id)
    }

    pub fn mark_paid(&mut self, id: SplitId) -> Result<&BillSplit, SplitError> {
        let split = self
            .splits
            .iter()
            .find(|s| s.id == id)
            .ok_or(SplitError::UnknownSplit(id))?;
        if !(split.total > 0.0) {
            return Err(SplitError::NothingToPay(id));
        }
        self.paid.insert(id);
        Ok(split)
    }

    pub fn pending(&self) -> Vec<&BillSplit> {
        self.payable().filter(|s| !self.is_paid(s.id)).collect()
    }

    pub fn paid_count(&self) -> usize {
        self.payable().filter(|s| self.is_paid(s.id)).count()
    }

    /// The table can be finished once any split is paid, even with others
    /// still pending. Use [`Self::outstanding`] to see what is left.
    pub fn can_finish(&self) -> bool {
        self.paid_count() > 0
    }

    pub fn all_paid(&self) -> bool {
        self.payable().all(|s| self.is_paid(s.id))
    }

    pub fn outstanding(&self) -> f64 {
        self.pending().iter().map(|s| s.total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, name: &str, quantity: i64, unit_price: f64, discount: f64) -> SaleItem {
        SaleItem {
            id,
            sale_id: 1,
            product_name: name.to_string(),
            quantity,
            unit_price,
            discount,
            total: quantity as f64 * unit_price - discount,
        }
    }

    fn order() -> Vec<SaleItem> {
        vec![
            item(1, "Tacos al pastor", 3, 30.0, 0.0),
            item(2, "Agua de jamaica", 2, 25.0, 10.0),
        ]
    }

    fn session(n: usize) -> SplitSession {
        let items = order();
        let total = items.iter().map(|i| i.total).sum();
        SplitSession::new(items, total, n).unwrap()
    }

    #[test]
    fn test_rejects_zero_comensales() {
        assert_eq!(
            SplitSession::new(order(), 130.0, 0).unwrap_err(),
            SplitError::NoComensales
        );
    }

    #[test]
    fn test_items_mode_requires_full_assignment() {
        let mut s = session(2);
        assert_eq!(s.assign(1, 0, 2).unwrap(), 2);
        assert_eq!(s.assign(1, 1, 1).unwrap(), 1);
        assert_eq!(s.assign(2, 0, 1).unwrap(), 1);
        assert!(!s.can_confirm());
        assert_eq!(
            s.validate().unwrap_err(),
            SplitError::Unassigned { item_id: 2, remaining: 1 }
        );

        s.assign(2, 1, 1).unwrap();
        assert!(s.can_confirm());
        let splits = s.confirm().unwrap();
        // Drinks total 40 over 2 units: the discount is spread per unit.
        assert_eq!(splits[0].total, 60.0 + 20.0);
        assert_eq!(splits[1].total, 30.0 + 20.0);
        assert_eq!(splits[0].items.len(), 2);
    }

    #[test]
    fn test_assignment_is_clamped_to_remaining() {
        let mut s = session(3);
        assert_eq!(s.assign(1, 0, 2).unwrap(), 2);
        assert_eq!(s.assign(1, 1, 5).unwrap(), 1);
        assert_eq!(s.remaining(1).unwrap(), 0);
        assert_eq!(s.assign(1, 2, 1).unwrap(), 0);

        // Reassigning the same split replaces its quantity.
        assert_eq!(s.assign(1, 0, 1).unwrap(), 1);
        assert_eq!(s.remaining(1).unwrap(), 1);
        assert_eq!(s.assign(1, 0, -3).unwrap(), 0);
        assert_eq!(s.remaining(1).unwrap(), 2);
    }

    #[test]
    fn test_unknown_item_or_split() {
        let mut s = session(2);
        assert_eq!(s.assign(9, 0, 1).unwrap_err(), SplitError::UnknownItem(9));
        assert_eq!(s.assign(1, 2, 1).unwrap_err(), SplitError::UnknownSplit(2));
    }

    #[test]
    fn test_equal_mode() {
        let mut s = session(3);
        s.set_mode(SplitModeKind::Equal);
        assert!(s.can_confirm());
        let splits = s.confirm().unwrap();
        assert_eq!(splits.len(), 3);
        for split in &splits {
            assert_eq!(split.total, 130.0 / 3.0);
            assert!(split.items.is_empty());
        }
    }

    #[test]
    fn test_custom_mode_tolerance() {
        let mut s = SplitSession::new(order(), 100.0, 2).unwrap();
        s.set_mode(SplitModeKind::Custom);
        assert!(!s.can_confirm());

        s.set_amount(0, 50.0).unwrap();
        s.set_amount(1, 49.01).unwrap();
        assert!(s.can_confirm());

        s.set_amount(1, 49.0).unwrap();
        assert!(matches!(s.validate(), Err(SplitError::AmountMismatch { .. })));

        s.set_amount(1, 51.5).unwrap();
        assert!(!s.can_confirm());

        s.set_amount(0, 0.0).unwrap();
        s.set_amount(1, 100.0).unwrap();
        assert_eq!(s.validate().unwrap_err(), SplitError::NonPositiveAmount(0));
    }

    #[test]
    fn test_distribute_evenly_absorbs_remainder() {
        let shares = distribute_evenly(100.0, 3);
        assert_eq!(shares, vec![33.33, 33.33, 33.34]);
        let cents: i64 = shares.iter().map(|a| (a * 100.0).round() as i64).sum();
        assert_eq!(cents, 10_000);

        let mut s = SplitSession::new(order(), 100.0, 3).unwrap();
        s.set_mode(SplitModeKind::Custom);
        s.distribute_evenly().unwrap();
        assert!(s.can_confirm());
        assert!(distribute_evenly(10.0, 0).is_empty());
    }

    #[test]
    fn test_mode_switch_discards_state() {
        let mut s = session(2);
        s.assign(1, 0, 3).unwrap();
        s.set_mode(SplitModeKind::Custom);
        s.set_amount(0, 10.0).unwrap();
        s.set_mode(SplitModeKind::Items);
        assert_eq!(s.remaining(1).unwrap(), 3);
        assert!(s.splits().iter().all(|sp| sp.total == 0.0 && sp.items.is_empty()));

        assert_eq!(
            s.set_amount(0, 1.0).unwrap_err(),
            SplitError::WrongMode { expected: "custom" }
        );
        s.set_mode(SplitModeKind::Equal);
        assert_eq!(
            s.assign(1, 0, 1).unwrap_err(),
            SplitError::WrongMode { expected: "items" }
        );
    }

    #[test]
    fn test_payment_selector() {
        let mut s = session(3);
        s.assign(1, 0, 3).unwrap();
        s.assign(2, 1, 2).unwrap();
        s.rename(0, "Ana").unwrap();
        let splits = s.confirm().unwrap();
        assert_eq!(splits[0].name, "Ana");

        let mut selector = SplitPaymentSelector::new(splits, HashSet::new());
        assert_eq!(selector.payable().count(), 2);
        assert!(!selector.can_finish());
        assert_eq!(selector.mark_paid(2).unwrap_err(), SplitError::NothingToPay(2));

        selector.mark_paid(0).unwrap();
        assert!(selector.can_finish());
        assert!(!selector.all_paid());
        assert_eq!(selector.outstanding(), 40.0);

        selector.mark_paid(1).unwrap();
        assert!(selector.all_paid());
        assert_eq!(selector.outstanding(), 0.0);
    }

    #[test]
    fn test_selector_honours_caller_paid_set() {
        let mut s = session(2);
        s.set_mode(SplitModeKind::Equal);
        let paid: HashSet<SplitId> = [1].into_iter().collect();
        let selector = SplitPaymentSelector::new(s.confirm().unwrap(), paid);
        assert!(selector.is_paid(1));
        assert_eq!(selector.pending().len(), 1);
        assert!(selector.can_finish());
    }
}
