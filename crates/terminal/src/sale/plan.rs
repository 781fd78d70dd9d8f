//! Commit planning.
//!
//! Pure functions that turn a cart and a stock read into the write set of
//! one commit attempt. Nothing here touches the store, so every rule can be
//! checked without one.

use std::collections::{BTreeMap, HashMap};

use balcao_core::{
    BusinessId, CartLine, Money, Payment, PaymentEntry, ProductId, SaleLine, StockItem,
};

use super::error::{CommitError, ValidationError};
use crate::store::{SaleDraft, StockWrite, WriteSet};

/// A sale as the register submits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub business_id: BusinessId,
    pub lines: Vec<CartLine>,
    pub payments: Vec<Payment>,
    pub discount: Money,
    pub surcharge: Money,
    /// Let stock go below zero instead of rejecting the sale.
    pub allow_negative_stock: bool,
}

impl CommitRequest {
    /// A request with no discount or surcharge.
    #[must_use]
    pub fn new(
        business_id: impl Into<BusinessId>,
        lines: Vec<CartLine>,
        payments: Vec<Payment>,
    ) -> Self {
        Self {
            business_id: business_id.into(),
            lines,
            payments,
            discount: Money::ZERO,
            surcharge: Money::ZERO,
            allow_negative_stock: false,
        }
    }

    #[must_use]
    pub const fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    #[must_use]
    pub const fn with_surcharge(mut self, surcharge: Money) -> Self {
        self.surcharge = surcharge;
        self
    }

    #[must_use]
    pub const fn allowing_negative_stock(mut self) -> Self {
        self.allow_negative_stock = true;
        self
    }
}

/// Monetary totals of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub surcharge: Money,
    pub final_amount: Money,
}

/// Reject requests that can never commit.
///
/// # Errors
///
/// Returns the first `ValidationError` found.
pub fn validate(request: &CommitRequest) -> Result<(), ValidationError> {
    if request.lines.is_empty() {
        return Err(ValidationError::EmptyCart);
    }
    for line in &request.lines {
        if line.quantity == 0 {
            return Err(ValidationError::ZeroQuantity(line.product_id.clone()));
        }
        if line.unit_price.is_negative() {
            return Err(ValidationError::NegativePrice(line.product_id.clone()));
        }
    }
    if request.discount.is_negative() {
        return Err(ValidationError::NegativeDiscount);
    }
    if request.surcharge.is_negative() {
        return Err(ValidationError::NegativeSurcharge);
    }
    if request.payments.is_empty() {
        return Err(ValidationError::NoPayments);
    }
    if let Some(index) = request
        .payments
        .iter()
        .position(|p| !p.amount_paid.is_positive())
    {
        return Err(ValidationError::NonPositivePayment { index });
    }
    Ok(())
}

/// `final_amount = max(0, subtotal - discount + surcharge)`.
#[must_use]
pub fn totals(request: &CommitRequest) -> Totals {
    let subtotal: Money = request.lines.iter().map(CartLine::total).sum();
    let final_amount = (subtotal - request.discount + request.surcharge).max_zero();
    Totals {
        subtotal,
        discount: request.discount,
        surcharge: request.surcharge,
        final_amount,
    }
}

/// Work out the change for each payment.
///
/// The first cash payment carries the whole excess; every other payment
/// gets zero change.
///
/// # Errors
///
/// Returns `ValidationError::Underpaid` if the payments do not cover
/// `final_amount`, and a change error if the excess cannot be handed back
/// from cash.
pub fn settle_payments(
    payments: &[Payment],
    final_amount: Money,
) -> Result<Vec<PaymentEntry>, ValidationError> {
    let paid: Money = payments.iter().map(|p| p.amount_paid).sum();
    if paid < final_amount {
        return Err(ValidationError::Underpaid {
            due: final_amount,
            paid,
        });
    }

    let excess = paid - final_amount;
    let change_at = if excess.is_positive() {
        let (index, cash) = payments
            .iter()
            .enumerate()
            .find(|(_, p)| p.method.is_cash())
            .ok_or(ValidationError::ChangeWithoutCash { excess })?;
        if excess > cash.amount_paid {
            return Err(ValidationError::ChangeExceedsCash {
                excess,
                cash: cash.amount_paid,
            });
        }
        Some(index)
    } else {
        None
    };

    Ok(payments
        .iter()
        .enumerate()
        .map(|(index, p)| PaymentEntry {
            method: p.method,
            amount_paid: p.amount_paid,
            change: if change_at == Some(index) {
                excess
            } else {
                Money::ZERO
            },
        })
        .collect())
}

/// Requested quantity per distinct product, summed across lines.
#[must_use]
pub fn requested_quantities(lines: &[CartLine]) -> BTreeMap<ProductId, u64> {
    let mut requested = BTreeMap::new();
    for line in lines {
        *requested.entry(line.product_id.clone()).or_insert(0_u64) += u64::from(line.quantity);
    }
    requested
}

/// Plan one commit attempt against a stock read.
///
/// # Errors
///
/// Returns `CommitError::ProductNotFound` if a product was not read, and
/// `CommitError::StockInsufficient` for the first product (in id order)
/// whose requested quantity exceeds its stock, unless negative stock is
/// allowed.
pub fn plan_writes(
    request: &CommitRequest,
    totals: &Totals,
    payments: &[PaymentEntry],
    stock: &[StockItem],
) -> Result<WriteSet, CommitError> {
    let by_id: HashMap<&ProductId, &StockItem> =
        stock.iter().map(|item| (&item.product_id, item)).collect();

    let mut writes = Vec::new();
    for (product_id, requested) in requested_quantities(&request.lines) {
        let item = by_id
            .get(&product_id)
            .ok_or_else(|| CommitError::ProductNotFound(product_id.clone()))?;

        let available = item.quantity_on_hand;
        let decrement = i64::try_from(requested).unwrap_or(i64::MAX);
        if !request.allow_negative_stock && decrement > available {
            return Err(CommitError::StockInsufficient {
                product_id,
                available,
                requested,
            });
        }

        writes.push(StockWrite {
            product_id,
            expected_version: item.version,
            quantity_on_hand: available.saturating_sub(decrement),
        });
    }

    let lines = request
        .lines
        .iter()
        .map(|line| SaleLine {
            product_id: line.product_id.clone(),
            name: by_id
                .get(&line.product_id)
                .map(|item| item.name.clone())
                .unwrap_or_default(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            cost_price: line.cost_price,
            note: line.note.clone(),
            line_total: line.total(),
        })
        .collect();

    Ok(WriteSet {
        stock: writes,
        sale: SaleDraft {
            business_id: request.business_id.clone(),
            lines,
            subtotal: totals.subtotal,
            discount: totals.discount,
            surcharge: totals.surcharge,
            final_amount: totals.final_amount,
            payments: payments.to_vec(),
        },
    })
}
