//! # Settlement Repository
//!
//! Append-only settlement ledger: one entry per completed job, two paid
//! flags that only ever go from unpaid to paid.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Settlement Lifecycle                                 │
//! │                                                                         │
//! │  1. SETTLE                                                             │
//! │     └── settle_job() → resolve rates → split_quote → record            │
//! │         (rates copied into the row; UNIQUE(job_id) guards retries)     │
//! │                                                                         │
//! │  2. RECONCILE                                                          │
//! │     └── mark_counterparty_paid(platform)   UPDATE … AND paid = 0       │
//! │     └── mark_counterparty_paid(corner)     rejected for via_corner     │
//! │                                                                         │
//! │  3. REPORT                                                             │
//! │     └── outstanding(facility, [from, to)) → platform/corner/total due  │
//! │                                                                         │
//! │  No delete. Frozen columns are also guarded by a trigger.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::rates::RateConfigRepository;
use ripara_core::ledger::summarize_outstanding;
use ripara_core::split::split_quote;
use ripara_core::{
    Counterparty, DateRange, LineItem, NewSettlement, OutstandingSummary, PaymentCollectionMethod,
    SettlementLedgerEntry, ValidationError,
};

const ENTRY_COLUMNS: &str = r#"
    id, job_id, facility_id, referrer_id,
    grand_total_cents, parts_purchase_cost_cents, gross_margin_cents,
    centro_commission_cents, corner_commission_cents, platform_commission_cents,
    unallocated_cents,
    centro_rate_bps, corner_rate_bps, platform_rate_bps,
    payment_collection_method,
    platform_paid, platform_paid_at, corner_paid, corner_paid_at,
    created_at
"#;

/// Repository for settlement ledger operations.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    /// Creates a new SettlementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets an entry by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SettlementLedgerEntry>> {
        let sql = format!("SELECT {} FROM settlement_entries WHERE id = ?1", ENTRY_COLUMNS);

        let entry = sqlx::query_as::<_, SettlementLedgerEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    /// Gets the entry recorded for a job.
    pub async fn get_by_job_id(&self, job_id: &str) -> DbResult<Option<SettlementLedgerEntry>> {
        let sql = format!("SELECT {} FROM settlement_entries WHERE job_id = ?1", ENTRY_COLUMNS);

        let entry = sqlx::query_as::<_, SettlementLedgerEntry>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    /// Lists a facility's entries created in `[from, to)`, oldest first.
    pub async fn list_for_facility(
        &self,
        facility_id: &str,
        range: &DateRange,
    ) -> DbResult<Vec<SettlementLedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM settlement_entries
            WHERE facility_id = ?1
              AND created_at >= ?2
              AND created_at < ?3
            ORDER BY created_at ASC
            "#,
            ENTRY_COLUMNS
        );

        let entries = sqlx::query_as::<_, SettlementLedgerEntry>(&sql)
            .bind(facility_id)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// What the facility still owes for entries created in `range`.
    ///
    /// The corner leg of via_corner entries is never counted.
    pub async fn outstanding(
        &self,
        facility_id: &str,
        range: &DateRange,
    ) -> DbResult<OutstandingSummary> {
        let entries = self.list_for_facility(facility_id, range).await?;
        let summary = summarize_outstanding(&entries, facility_id, range);

        debug!(
            facility_id = %facility_id,
            open_entries = summary.open_entries,
            total_due = %summary.total_due,
            "Outstanding computed"
        );

        Ok(summary)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Records the settlement of a job.
    ///
    /// ## Errors
    /// - `Validation(Duplicate)` when the job already has an entry; the
    ///   existing entry is left untouched
    /// - `Validation(_)` for missing ids or via_corner without a referrer
    pub async fn record_settlement(&self, new: &NewSettlement) -> DbResult<SettlementLedgerEntry> {
        new.validate()?;

        let entry = SettlementLedgerEntry::from_new(new, Uuid::new_v4().to_string(), Utc::now());

        debug!(
            entry_id = %entry.id,
            job_id = %entry.job_id,
            facility_id = %entry.facility_id,
            "Recording settlement"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO settlement_entries (
                id, job_id, facility_id, referrer_id,
                grand_total_cents, parts_purchase_cost_cents, gross_margin_cents,
                centro_commission_cents, corner_commission_cents, platform_commission_cents,
                unallocated_cents,
                centro_rate_bps, corner_rate_bps, platform_rate_bps,
                payment_collection_method,
                platform_paid, platform_paid_at, corner_paid, corner_paid_at,
                created_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7,
                ?8, ?9, ?10,
                ?11,
                ?12, ?13, ?14,
                ?15,
                ?16, ?17, ?18, ?19,
                ?20
            )
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.job_id)
        .bind(&entry.facility_id)
        .bind(&entry.referrer_id)
        .bind(entry.grand_total_cents)
        .bind(entry.parts_purchase_cost_cents)
        .bind(entry.gross_margin_cents)
        .bind(entry.centro_commission_cents)
        .bind(entry.corner_commission_cents)
        .bind(entry.platform_commission_cents)
        .bind(entry.unallocated_cents)
        .bind(entry.centro_rate_bps)
        .bind(entry.corner_rate_bps)
        .bind(entry.platform_rate_bps)
        .bind(entry.payment_collection_method)
        .bind(entry.platform_paid)
        .bind(entry.platform_paid_at)
        .bind(entry.corner_paid)
        .bind(entry.corner_paid_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            let err = DbError::from(e);
            if err.is_unique_violation_on("job_id") {
                warn!(job_id = %new.job_id, "Settlement already recorded for job");
                return Err(ValidationError::duplicate("job_id", &new.job_id).into());
            }
            return Err(err);
        }

        info!(
            entry_id = %entry.id,
            job_id = %entry.job_id,
            gross_margin = %entry.gross_margin(),
            method = ?entry.payment_collection_method,
            "Settlement recorded"
        );

        Ok(entry)
    }

    /// Settles a completed job in one call.
    ///
    /// Resolves the facility's current rates, splits the finalized quote and
    /// records the entry. The rates are copied into the entry, so later rate
    /// edits never change it.
    pub async fn settle_job(
        &self,
        job_id: &str,
        facility_id: &str,
        items: &[LineItem],
        method: PaymentCollectionMethod,
    ) -> DbResult<SettlementLedgerEntry> {
        let resolved = RateConfigRepository::new(self.pool.clone())
            .resolve(facility_id)
            .await?;

        let split = split_quote(items, &resolved.rates)?;

        for warning in &split.warnings {
            warn!(job_id = %job_id, ?warning, "Split produced a warning");
        }

        let new = NewSettlement {
            job_id: job_id.to_string(),
            facility_id: facility_id.to_string(),
            referrer_id: resolved.referrer_id,
            split,
            payment_collection_method: method,
        };

        self.record_settlement(&new).await
    }

    /// Marks one counterparty's commission as paid.
    ///
    /// Idempotent: an already-paid leg is returned unchanged, keeping its
    /// original timestamp.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown entry
    /// - `Core(CornerSettledByReferrer)` for the corner leg of a via_corner entry
    pub async fn mark_counterparty_paid(
        &self,
        entry_id: &str,
        counterparty: Counterparty,
    ) -> DbResult<SettlementLedgerEntry> {
        let entry = self
            .get_by_id(entry_id)
            .await?
            .ok_or_else(|| DbError::not_found("SettlementLedgerEntry", entry_id))?;

        if !entry.check_markable(counterparty)? {
            debug!(entry_id = %entry_id, ?counterparty, "Already paid, nothing to do");
            return Ok(entry);
        }

        // The `paid = 0` guard keeps concurrent callers from overwriting
        // each other's timestamp.
        let sql = match counterparty {
            Counterparty::Platform => {
                r#"
                UPDATE settlement_entries
                SET platform_paid = 1, platform_paid_at = ?2
                WHERE id = ?1 AND platform_paid = 0
                "#
            }
            Counterparty::Corner => {
                r#"
                UPDATE settlement_entries
                SET corner_paid = 1, corner_paid_at = ?2
                WHERE id = ?1 AND corner_paid = 0 AND payment_collection_method = 'direct'
                "#
            }
        };

        let updated = sqlx::query(sql)
            .bind(entry_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated > 0 {
            info!(entry_id = %entry_id, ?counterparty, "Counterparty marked paid");
        }

        self.get_by_id(entry_id)
            .await?
            .ok_or_else(|| DbError::not_found("SettlementLedgerEntry", entry_id))
    }

    /// Corrects how the customer's payment was collected.
    ///
    /// Moving to via_corner requires a referrer and an unpaid corner leg.
    pub async fn set_collection_method(
        &self,
        entry_id: &str,
        method: PaymentCollectionMethod,
    ) -> DbResult<SettlementLedgerEntry> {
        let entry = self
            .get_by_id(entry_id)
            .await?
            .ok_or_else(|| DbError::not_found("SettlementLedgerEntry", entry_id))?;

        if !entry.check_method_change(method)? {
            return Ok(entry);
        }

        sqlx::query(
            r#"
            UPDATE settlement_entries
            SET payment_collection_method = ?2
            WHERE id = ?1 AND corner_paid = 0
            "#,
        )
        .bind(entry_id)
        .bind(method)
        .execute(&self.pool)
        .await?;

        info!(entry_id = %entry_id, ?method, "Collection method corrected");

        self.get_by_id(entry_id)
            .await?
            .ok_or_else(|| DbError::not_found("SettlementLedgerEntry", entry_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
