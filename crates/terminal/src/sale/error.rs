//! Sale commit errors.

use thiserror::Error;

use balcao_core::{Money, ProductId};

use crate::store::StoreError;

/// A malformed commit request. Nothing was read or written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("quantity for {0} must be at least 1")]
    ZeroQuantity(ProductId),

    #[error("price for {0} is negative")]
    NegativePrice(ProductId),

    #[error("discount is negative")]
    NegativeDiscount,

    #[error("surcharge is negative")]
    NegativeSurcharge,

    #[error("no payment was given")]
    NoPayments,

    #[error("payment #{index} must be greater than zero")]
    NonPositivePayment { index: usize },

    #[error("paid {paid} of {due}")]
    Underpaid { due: Money, paid: Money },

    #[error("overpaid by {excess} with no cash payment to give change from")]
    ChangeWithoutCash { excess: Money },

    #[error("change of {excess} exceeds the {cash} given in cash")]
    ChangeExceedsCash { excess: Money, cash: Money },
}

/// Errors from [`super::SaleCommitter::commit`].
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("invalid sale: {0}")]
    Validation(#[from] ValidationError),

    #[error("product {0} does not exist")]
    ProductNotFound(ProductId),

    /// Not enough stock for one product; the whole sale was rejected.
    #[error("insufficient stock for {product_id}: {available} available, {requested} requested")]
    StockInsufficient {
        product_id: ProductId,
        available: i64,
        requested: u64,
    },

    /// Concurrent writers kept invalidating the read set.
    #[error("sale could not be committed after {attempts} attempts")]
    TransactionConflict { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
