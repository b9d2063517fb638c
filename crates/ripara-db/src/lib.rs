//! # ripara-db: Settlement Ledger Storage
//!
//! SQLite storage for the settlement ledger and the commission rate
//! configuration it reads from, using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ripara Settlement Flow                           │
//! │                                                                         │
//! │  Intake completed, job repaired, quote finalized                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     ripara-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌─────────────┐ │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded)  │ │   │
//! │  │   │               │    │ SettlementRepo     │  │             │ │   │
//! │  │   │ SqlitePool    │◄───│ RateConfigRepo     │  │ 001_ledger  │ │   │
//! │  │   └───────────────┘    └─────────┬──────────┘  └─────────────┘ │   │
//! │  │                                  │ split_quote, summarize       │   │
//! │  │                                  ▼                              │   │
//! │  │                          ripara-core (pure)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Settlement ledger and rate configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ripara_db::{Database, DbConfig};
//! use ripara_core::PaymentCollectionMethod;
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//!
//! let entry = db
//!     .settlements()
//!     .settle_job("JOB-1", "fac-1", &items, PaymentCollectionMethod::Direct)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::{FacilityRates, RateConfigRepository, ResolvedRates, SettlementRepository};
