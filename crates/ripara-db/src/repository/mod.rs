//! # Repository Module
//!
//! Database repository implementations for the settlement ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Caller (back office, job completion hook)                             │
//! │       │                                                                 │
//! │       │  db.settlements().settle_job("JOB-1", "fac-1", &items, method) │
//! │       ▼                                                                 │
//! │  SettlementRepository ───uses───► RateConfigRepository                 │
//! │  ├── record_settlement            ├── resolve(facility)                │
//! │  ├── mark_counterparty_paid       ├── upsert_facility_rates            │
//! │  ├── outstanding                  └── set_platform_rate                │
//! │  └── get_by_id / get_by_job_id / list_for_facility                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (settlement_entries, facility_rates, platform_settings)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`SettlementRepository`] - Append-only ledger and reconciliation
//! - [`RateConfigRepository`] - Commission rate configuration

pub mod rates;
pub mod settlement;

pub use rates::{FacilityRates, RateConfigRepository, ResolvedRates};
pub use settlement::SettlementRepository;
