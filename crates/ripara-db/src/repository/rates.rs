//! # Rate Configuration Repository
//!
//! Per-facility and platform-wide commission rates, and the referrer lookup
//! that decides corner eligibility.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  facility_rates[facility]          platform_settings                    │
//! │  ├── centro_rate_bps               └── platform_rate_bps                │
//! │  ├── corner_rate_bps                          │                         │
//! │  └── referrer_id ──┐                          │                         │
//! │                    ▼                          │                         │
//! │        referrer? ──no──► corner = 0           │                         │
//! │            │yes                               │                         │
//! │            ▼                                  ▼                         │
//! │        ResolvedRates { centro, corner, platform, referrer_id }          │
//! │                                                                         │
//! │  Copied into the ledger entry at settlement; editing these tables      │
//! │  never touches recorded entries.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use ripara_core::validation::{validate_rate, validate_required, validate_split_rates};
use ripara_core::{CommissionRate, SplitRates};

/// Stored rates of one facility.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FacilityRates {
    pub facility_id: String,
    pub centro_rate_bps: u32,
    pub corner_rate_bps: u32,
    /// Collection point sourcing this facility's jobs, if any.
    pub referrer_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FacilityRates {
    pub fn new(
        facility_id: impl Into<String>,
        centro: CommissionRate,
        corner: CommissionRate,
        referrer_id: Option<String>,
    ) -> Self {
        FacilityRates {
            facility_id: facility_id.into(),
            centro_rate_bps: centro.bps(),
            corner_rate_bps: corner.bps(),
            referrer_id,
            updated_at: Utc::now(),
        }
    }

    pub fn centro_rate(&self) -> CommissionRate {
        CommissionRate::from_bps(self.centro_rate_bps)
    }

    pub fn corner_rate(&self) -> CommissionRate {
        CommissionRate::from_bps(self.corner_rate_bps)
    }
}

/// Rates ready to hand to the split engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRates {
    pub rates: SplitRates,
    pub referrer_id: Option<String>,
}

/// Repository for rate configuration.
#[derive(Debug, Clone)]
pub struct RateConfigRepository {
    pool: SqlitePool,
}

impl RateConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RateConfigRepository { pool }
    }

    /// Current platform-wide rate, if configured.
    pub async fn platform_rate(&self) -> DbResult<Option<CommissionRate>> {
        let bps: Option<u32> =
            sqlx::query_scalar("SELECT platform_rate_bps FROM platform_settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(bps.map(CommissionRate::from_bps))
    }

    /// Sets the platform-wide rate.
    pub async fn set_platform_rate(&self, rate: CommissionRate) -> DbResult<()> {
        validate_rate("platform rate", rate)?;

        sqlx::query(
            r#"
            INSERT INTO platform_settings (id, platform_rate_bps, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                platform_rate_bps = excluded.platform_rate_bps,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(rate.bps())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(platform_rate_bps = rate.bps(), "Platform rate updated");
        Ok(())
    }

    /// Gets the stored rates of a facility.
    pub async fn get_facility_rates(&self, facility_id: &str) -> DbResult<Option<FacilityRates>> {
        let rates = sqlx::query_as::<_, FacilityRates>(
            r#"
            SELECT facility_id, centro_rate_bps, corner_rate_bps, referrer_id, updated_at
            FROM facility_rates
            WHERE facility_id = ?1
            "#,
        )
        .bind(facility_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(rates)
    }

    /// Inserts or replaces the rates of a facility.
    pub async fn upsert_facility_rates(&self, rates: &FacilityRates) -> DbResult<()> {
        validate_required("facility_id", &rates.facility_id)?;
        validate_rate("centro rate", rates.centro_rate())?;
        validate_rate("corner rate", rates.corner_rate())?;

        sqlx::query(
            r#"
            INSERT INTO facility_rates (
                facility_id, centro_rate_bps, corner_rate_bps, referrer_id, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(facility_id) DO UPDATE SET
                centro_rate_bps = excluded.centro_rate_bps,
                corner_rate_bps = excluded.corner_rate_bps,
                referrer_id = excluded.referrer_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rates.facility_id)
        .bind(rates.centro_rate_bps)
        .bind(rates.corner_rate_bps)
        .bind(&rates.referrer_id)
        .bind(rates.updated_at)
        .execute(&self.pool)
        .await?;

        info!(
            facility_id = %rates.facility_id,
            centro_rate_bps = rates.centro_rate_bps,
            corner_rate_bps = rates.corner_rate_bps,
            referrer_id = ?rates.referrer_id,
            "Facility rates updated"
        );
        Ok(())
    }

    /// Resolves the rate triple for a job at `facility_id`.
    ///
    /// ## Errors
    /// - `NotFound` when the facility or the platform rate is not configured
    /// - `Validation` when the combined rates exceed 100%
    pub async fn resolve(&self, facility_id: &str) -> DbResult<ResolvedRates> {
        let facility = self
            .get_facility_rates(facility_id)
            .await?
            .ok_or_else(|| DbError::not_found("FacilityRates", facility_id))?;

        let platform = self
            .platform_rate()
            .await?
            .ok_or_else(|| DbError::not_found("PlatformSettings", "platform_rate"))?;

        let referrer_id = facility.referrer_id.clone().filter(|r| !r.trim().is_empty());

        let mut rates = SplitRates {
            centro: facility.centro_rate(),
            corner: facility.corner_rate(),
            platform,
        };
        if referrer_id.is_none() {
            rates = rates.without_corner();
        }

        validate_split_rates(&rates)?;

        debug!(
            facility_id = %facility_id,
            total_bps = rates.total_bps(),
            has_referrer = referrer_id.is_some(),
            "Rates resolved"
        );

        Ok(ResolvedRates { rates, referrer_id })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
