//! # Domain Types
//!
//! Core domain types for the inventory ledger and settlement engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    Movement     │   │      Sale       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  direction      │   │  status         │       │
//! │  │  kind           │   │  reason         │   │  payment_method │       │
//! │  │  units_per_sale │   │  qty / cost     │   │  subtotal/total │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────┐      │
//! │  │ ComboComponent  │   │ CreditInstrument │   │  PurchaseOrder  │      │
//! │  │  qty_per_combo  │   │  daily interest  │   │  stock receipt  │      │
//! │  └─────────────────┘   └──────────────────┘   └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, receipt fields, etc.) - human-readable
//!
//! ## The Ledger Rule
//! [`Movement`] rows are never updated or deleted. Corrections are made by
//! appending an opposite-direction entry that references the same
//! `ref_type`/`ref_id`. Current stock is always derived by summation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Product
// =============================================================================

/// Kind of sellable product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// A plain product whose stock lives in the movement ledger
    /// (its own ledger, or a shared pool's).
    Simple,
    /// A composite product assembled from simple components.
    /// Combos never hold stock directly.
    Combo,
}

impl ProductKind {
    /// Stable string form used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Simple => "simple",
            ProductKind::Combo => "combo",
        }
    }

    /// Parses the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(ProductKind::Simple),
            "combo" => Some(ProductKind::Combo),
            _ => None,
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product available for sale or purchase.
///
/// ## Pools and Presentations
/// A simple product may declare `base_pool_product_id`: the product whose
/// ledger actually holds the stock. `units_per_sale` is the conversion
/// factor — how many base units one sale-unit of this presentation
/// consumes. A "case" and a "bottle" of the same liquid are two
/// presentations over one pool, so they draw from one ledger and can
/// never double count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this product belongs to.
    pub tenant_id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Simple or combo.
    pub kind: ProductKind,

    /// Sale price per sale-unit.
    pub price: Decimal,

    /// Whether this product's lines are taxable at checkout.
    pub taxable: bool,

    /// Below-minimum alert threshold, in sale units (simple only).
    pub stock_minimum: Option<Decimal>,

    /// The product whose ledger holds the stock. `None` means this
    /// product is its own pool.
    pub base_pool_product_id: Option<String>,

    /// Base units consumed per sale-unit sold. `1` for non-presentations.
    pub units_per_sale: Decimal,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    /// When the product was created.
    pub created_at: DateTime<Utc>,

    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The product id whose ledger holds this product's stock.
    #[inline]
    pub fn pool_product_id(&self) -> &str {
        self.base_pool_product_id.as_deref().unwrap_or(&self.id)
    }

    /// True when this product is a presentation over another product's pool.
    #[inline]
    pub fn is_presentation(&self) -> bool {
        self.base_pool_product_id.is_some()
    }
}

/// A component link of a combo product.
///
/// Invariant: `component_product_id` always references a [`ProductKind::Simple`]
/// product — combos never nest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComboComponent {
    pub id: String,
    /// The combo that owns this link.
    pub combo_id: String,
    /// The simple product consumed when the combo sells.
    pub component_product_id: String,
    /// Sale-units of the component consumed per combo unit.
    pub qty_per_combo: Decimal,
}

// =============================================================================
// Movement (the ledger)
// =============================================================================

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "in",
            MovementDirection::Out => "out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(MovementDirection::In),
            "out" => Some(MovementDirection::Out),
            _ => None,
        }
    }
}

/// Business reason for a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    /// Stock left through a completed sale.
    Sale,
    /// Stock arrived through a supplier purchase.
    Purchase,
    /// Manual correction.
    Adjust,
    /// Compensating entry reversing a voided sale.
    Void,
    /// Spoilage, breakage, shrinkage.
    Waste,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Sale => "sale",
            MovementReason::Purchase => "purchase",
            MovementReason::Adjust => "adjust",
            MovementReason::Void => "void",
            MovementReason::Waste => "waste",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(MovementReason::Sale),
            "purchase" => Some(MovementReason::Purchase),
            "adjust" => Some(MovementReason::Adjust),
            "void" => Some(MovementReason::Void),
            "waste" => Some(MovementReason::Waste),
            _ => None,
        }
    }
}

/// One immutable row of the stock ledger.
///
/// ## Invariant
/// Never updated or deleted once written. `unit_cost` is set only on
/// `In` movements; voids and other compensating entries carry no cost so
/// the average-cost figure stays a purchase-cost average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    pub id: String,
    pub tenant_id: String,
    /// The pool product whose stock changed. Presentations never
    /// accumulate rows of their own.
    pub product_id: String,
    pub direction: MovementDirection,
    pub reason: MovementReason,
    /// Base units moved. Always positive.
    pub qty: Decimal,
    /// Cost per base unit. Only meaningful on `In`.
    pub unit_cost: Option<Decimal>,
    /// What originated this entry, e.g. `"sale"` / sale id.
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A movement about to be appended to the ledger.
///
/// The ledger assigns the id and timestamp on append.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub tenant_id: String,
    pub product_id: String,
    pub direction: MovementDirection,
    pub reason: MovementReason,
    pub qty: Decimal,
    pub unit_cost: Option<Decimal>,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a sale.
///
/// ## State Machine
/// ```text
/// Pending ──► Completed ──► Voided
///    │
///    └──► (discarded: never confirmed, no ledger effect)
/// ```
/// Pending sales never have ledger movements. Movements are written
/// exactly once at the Completed transition and reversed exactly once at
/// the Voided transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Awaiting out-of-band confirmation (cash in person, bank transfer).
    Pending,
    /// Settled: ledger movements written.
    Completed,
    /// Reversed with compensating entries.
    Voided,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Voided => "voided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SaleStatus::Pending),
            "completed" => Some(SaleStatus::Completed),
            "voided" => Some(SaleStatus::Voided),
            _ => None,
        }
    }
}

/// How a sale is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash collected in person. Deferred: confirmed by staff.
    Cash,
    /// Bank transfer. Deferred: confirmed by staff.
    Transfer,
    /// Card on an external terminal. Settles immediately.
    Card,
    /// Store credit terms. Settles immediately and opens a
    /// [`CreditInstrument`].
    Credit,
}

impl PaymentMethod {
    /// Deferred methods create a `Pending` sale with no ledger movements;
    /// stock must not be reserved against an unconfirmed order.
    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, PaymentMethod::Cash | PaymentMethod::Transfer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "transfer" => Some(PaymentMethod::Transfer),
            "card" => Some(PaymentMethod::Card),
            "credit" => Some(PaymentMethod::Credit),
            _ => None,
        }
    }
}

/// A sale transaction header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub tenant_id: String,
    pub status: SaleStatus,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// Running total of credit payments applied against this sale.
    pub paid_amount: Decimal,
    pub notes: Option<String>,
    pub void_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
}

/// A line item in a sale.
///
/// Uses the snapshot pattern: product details are frozen at time of sale
/// so history survives later product edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// Unit price at time of sale (frozen).
    pub unit_price: Decimal,
    /// Taxable flag at time of sale (frozen).
    pub taxable: bool,
    /// Sale-units sold.
    pub quantity: Decimal,
    /// unit_price × quantity.
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchase (stock receipt)
// =============================================================================

/// A supplier purchase order header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub tenant_id: String,
    pub supplier_id: Option<String>,
    pub total_cost: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A line item of a purchase order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: String,
    pub product_id: String,
    /// Sale-units received (converted to base units by the pool resolver
    /// when the ledger entry is written).
    pub quantity: Decimal,
    /// Cost per sale-unit, as invoiced. `quantity * unit_cost` is the
    /// line cost; the per-base-unit figure lives on the ledger entry.
    pub unit_cost: Decimal,
    pub line_cost: Decimal,
}

// =============================================================================
// Credit
// =============================================================================

/// Lifecycle state of a credit instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Active,
    Paid,
    Cancelled,
}

impl CreditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditStatus::Active => "active",
            CreditStatus::Paid => "paid",
            CreditStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CreditStatus::Active),
            "paid" => Some(CreditStatus::Paid),
            "cancelled" => Some(CreditStatus::Cancelled),
            _ => None,
        }
    }
}

/// An interest-accruing balance owed by a customer, created when a sale
/// settles on credit terms.
///
/// ## Accrual Model
/// Interest is simple, daily, and lazy: nothing runs on a schedule.
/// [`crate::credit::accrue`] is invoked whenever the instrument is read
/// or paid, and is idempotent per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditInstrument {
    pub id: String,
    pub tenant_id: String,
    /// The sale that originated this debt.
    pub sale_id: Option<String>,
    pub customer_id: Option<String>,
    /// Principal at creation.
    pub initial_amount: Decimal,
    /// Accumulated interest to date.
    pub interest_amount: Decimal,
    /// What is owed right now.
    pub current_balance: Decimal,
    /// Fractional daily rate, e.g. `0.001` = 0.1% per day.
    pub interest_rate: Decimal,
    pub status: CreditStatus,
    /// Informational only — nothing gates on it.
    pub due_date: Option<NaiveDate>,
    pub last_interest_calculation_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl CreditInstrument {
    /// Display helper; overdue status gates nothing.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == CreditStatus::Active
            && self.due_date.map(|d| today > d).unwrap_or(false)
    }
}

/// An immutable payment record against a credit instrument.
///
/// Creating the record and applying it to the balance are separate
/// operations performed in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPayment {
    pub id: String,
    pub instrument_id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Notification Outbox
// =============================================================================

/// An entry in the notification outbox.
///
/// Written in the same transaction as the event it describes (a deferred
/// sale awaiting confirmation, for instance), so the notification is
/// never orphaned and never precedes its data. An external notifier
/// drains the queue; the core does not wait on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationOutboxEntry {
    pub id: String,
    pub tenant_id: String,
    /// Event discriminator, e.g. `"sale.pending_confirmation"`.
    pub event_type: String,
    /// ID of the entity the event describes.
    pub entity_id: String,
    /// Full event data as JSON.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    /// When the external notifier picked this up.
    pub dispatched_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Tax Configuration
// =============================================================================

/// Tax configuration resolved from tenant settings.
///
/// A missing or out-of-range rate when tax is enabled is a hard checkout
/// failure — never silently defaulted to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxConfig {
    pub enabled: bool,
    /// Fractional rate, e.g. `0.16` = 16%. Present iff configured.
    pub rate: Option<Decimal>,
}

impl TaxConfig {
    /// Tax disabled: every checkout carries zero tax.
    pub const fn disabled() -> Self {
        TaxConfig {
            enabled: false,
            rate: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
