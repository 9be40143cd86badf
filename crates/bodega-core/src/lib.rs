//! # bodega-core: Pure Business Logic for Bodega
//!
//! The heart of the inventory ledger and settlement engine, as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bodega Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     Caller (HTTP / CLI layer)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            bodega-db: repositories + settlement engine          │   │
//! │  │      transactions, per-product locks, the movement ledger       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bodega-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ │   │
//! │  │   │  types  │ │  pool   │ │  combo  │ │ credit  │ │validation│ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └──────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Movement, Sale, CreditInstrument, …)
//! - [`pool`] - Pool resolver: presentations over shared stock pools
//! - [`combo`] - Combo calculator: floor-law availability and cost
//! - [`credit`] - Lazy daily interest accrual and payment application
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: deterministic - same input = same output
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Exact Arithmetic**: every quantity, cost and balance is a
//!    `rust_decimal::Decimal`; floats never touch money or stock
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod combo;
pub mod credit;
pub mod error;
pub mod pool;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ComponentShortfall, CoreError, CoreResult, ItemShortfall, ValidationError};
pub use types::*;
