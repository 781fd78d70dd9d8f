//! Cart and sale records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BusinessId, Money, PaymentMethod, ProductId, SaleId, SaleStatus};

/// A line in the terminal's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub unit_price: Money,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CartLine {
    /// A plain line with no cost price or note.
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, unit_price: Money, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            unit_price,
            quantity,
            cost_price: None,
            note: None,
        }
    }

    /// `unit_price × quantity`.
    #[must_use]
    pub fn total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// A payment tendered by the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub amount_paid: Money,
}

impl Payment {
    #[must_use]
    pub const fn new(method: PaymentMethod, amount_paid: Money) -> Self {
        Self {
            method,
            amount_paid,
        }
    }
}

/// A payment as recorded on the sale, with the change handed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub method: PaymentMethod,
    pub amount_paid: Money,
    pub change: Money,
}

/// Snapshot of a cart line at the moment of sale.
///
/// Name and prices are copied, not referenced, so later catalog edits never
/// rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub line_total: Money,
}

/// A completed sale. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: SaleId,
    pub business_id: BusinessId,
    pub lines: Vec<SaleLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub surcharge: Money,
    pub final_amount: Money,
    pub payments: Vec<PaymentEntry>,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
}

impl SaleRecord {
    /// Total change handed back across all payments.
    #[must_use]
    pub fn change(&self) -> Money {
        self.payments.iter().map(|p| p.change).sum()
    }
}
