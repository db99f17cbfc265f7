use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

/// The store a receipt came from. Only `name` is required once resolved;
/// everything else is opportunistically extracted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Store {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub tax_id: Option<String>,
}

impl Store {
    pub fn named(name: impl Into<String>) -> Self {
        Store {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Coarse grocery-style categorization assigned by keyword lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Dairy,
    Bakery,
    Meat,
    Seafood,
    Produce,
    Beverages,
    Snacks,
    Frozen,
    Pantry,
    Household,
    PersonalCare,
}

impl std::fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemCategory::Dairy => write!(f, "dairy"),
            ItemCategory::Bakery => write!(f, "bakery"),
            ItemCategory::Meat => write!(f, "meat"),
            ItemCategory::Seafood => write!(f, "seafood"),
            ItemCategory::Produce => write!(f, "produce"),
            ItemCategory::Beverages => write!(f, "beverages"),
            ItemCategory::Snacks => write!(f, "snacks"),
            ItemCategory::Frozen => write!(f, "frozen"),
            ItemCategory::Pantry => write!(f, "pantry"),
            ItemCategory::Household => write!(f, "household"),
            ItemCategory::PersonalCare => write!(f, "personal_care"),
        }
    }
}

/// One line item. `quantity` defaults to 1 and is a `Decimal` because
/// receipts sell fractional quantities (1.5 lb of produce).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptItem {
    pub name: String,
    pub price: Money,
    pub quantity: Decimal,
    pub unit_price: Option<Money>,
    pub category: Option<ItemCategory>,
    pub discounted: bool,
    /// Confidence in this one extraction (0.0–1.0).
    pub confidence: f32,
}

impl ReceiptItem {
    pub fn new(name: impl Into<String>, price: Money, confidence: f32) -> Self {
        ReceiptItem {
            name: name.into(),
            price,
            quantity: Decimal::ONE,
            unit_price: None,
            category: None,
            discounted: false,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Receipt totals block. The arithmetic relation
/// `total ≈ subtotal + tax − discount + tip` is checked and flagged by the
/// totals parser, never enforced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct ReceiptTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub tip: Option<Money>,
    pub discount: Option<Money>,
}

impl ReceiptTotals {
    /// `subtotal + tax − discount + tip` — what `total` should be.
    pub fn computed_total(self) -> Money {
        self.subtotal + self.tax - self.discount.unwrap_or_else(Money::zero)
            + self.tip.unwrap_or_else(Money::zero)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Visa,
    Mastercard,
    Amex,
    Discover,
    Debit,
    Check,
    ApplePay,
    GooglePay,
    PayPal,
    Other(String),
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "Cash"),
            PaymentMethod::Visa => write!(f, "Visa"),
            PaymentMethod::Mastercard => write!(f, "Mastercard"),
            PaymentMethod::Amex => write!(f, "Amex"),
            PaymentMethod::Discover => write!(f, "Discover"),
            PaymentMethod::Debit => write!(f, "Debit"),
            PaymentMethod::Check => write!(f, "Check"),
            PaymentMethod::ApplePay => write!(f, "Apple Pay"),
            PaymentMethod::GooglePay => write!(f, "Google Pay"),
            PaymentMethod::PayPal => write!(f, "PayPal"),
            PaymentMethod::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    /// Last four card digits when the receipt masks the rest.
    pub last_four: Option<String>,
}

/// The fully assembled receipt record. Built fresh inside one parse call and
/// immutable afterwards; edits are the persistence layer's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub store: Store,
    pub items: Vec<ReceiptItem>,
    pub totals: ReceiptTotals,
    pub date: Option<NaiveDate>,
    pub payment: Option<PaymentInfo>,
    pub raw_text: String,
    /// Aggregate confidence across all stages (0.0–1.0).
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Receipt {
    /// Empty receipt skeleton the orchestrator fills in stage by stage.
    pub fn empty(user_id: Option<String>, raw_text: impl Into<String>) -> Self {
        let now = Utc::now();
        Receipt {
            id: Uuid::new_v4(),
            user_id,
            store: Store::default(),
            items: Vec::new(),
            totals: ReceiptTotals::default(),
            date: None,
            payment: None,
            raw_text: raw_text.into(),
            confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn items_sum(&self) -> Money {
        self.items
            .iter()
            .map(|i| i.price)
            .fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_total_includes_all_parts() {
        let totals = ReceiptTotals {
            subtotal: Money::from_cents(1394),
            tax: Money::from_cents(84),
            total: Money::from_cents(1478),
            tip: Some(Money::from_cents(200)),
            discount: Some(Money::from_cents(100)),
        };
        assert_eq!(totals.computed_total(), Money::from_cents(1578));
    }

    #[test]
    fn computed_total_without_optionals() {
        let totals = ReceiptTotals {
            subtotal: Money::from_cents(1394),
            tax: Money::from_cents(84),
            total: Money::zero(),
            tip: None,
            discount: None,
        };
        assert_eq!(totals.computed_total(), Money::from_cents(1478));
    }

    #[test]
    fn items_sum_folds_prices() {
        let mut receipt = Receipt::empty(None, "");
        receipt.items.push(ReceiptItem::new("Apple", Money::from_cents(299), 0.7));
        receipt.items.push(ReceiptItem::new("Bananas", Money::from_cents(118), 0.7));
        assert_eq!(receipt.items_sum(), Money::from_cents(417));
    }

    #[test]
    fn item_new_defaults() {
        let item = ReceiptItem::new("Milk", Money::from_cents(349), 1.4);
        assert_eq!(item.quantity, Decimal::ONE);
        assert_eq!(item.confidence, 1.0);
        assert!(!item.discounted);
        assert!(item.category.is_none());
    }

    #[test]
    fn category_display() {
        assert_eq!(ItemCategory::PersonalCare.to_string(), "personal_care");
        assert_eq!(ItemCategory::Dairy.to_string(), "dairy");
    }

    #[test]
    fn payment_method_display() {
        assert_eq!(PaymentMethod::ApplePay.to_string(), "Apple Pay");
        assert_eq!(PaymentMethod::Other("Zelle".into()).to_string(), "Zelle");
    }
}
