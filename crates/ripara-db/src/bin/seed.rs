//! # Seed Data Generator
//!
//! Populates a ledger database with rates and settled demo jobs.
//!
//! ## Usage
//! ```bash
//! # 200 demo jobs (default)
//! cargo run -p ripara-db --bin seed
//!
//! # Custom amount and database path
//! cargo run -p ripara-db --bin seed -- --count 1000 --db ./data/ledger.db
//!
//! # Verbose logging
//! RUST_LOG=ripara_db=debug cargo run -p ripara-db --bin seed
//! ```
//!
//! ## Generated Data
//! - Platform rate 20%
//! - Three facilities, two sourced by collection points, one direct-only
//! - Demo jobs mixing display, battery and port repairs, some collected
//!   via the referrer, some with the platform leg already paid

use std::env;

use ripara_core::{CommissionRate, Counterparty, DateRange, LineItem, Money, PaymentCollectionMethod};
use ripara_db::{Database, DbConfig, FacilityRates};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (facility, centro %, corner %, referrer)
const FACILITIES: &[(&str, u32, u32, Option<&str>)] = &[
    ("fac-milano-centro", 70, 10, Some("corner-navigli")),
    ("fac-torino-lingotto", 65, 15, Some("corner-porta-nuova")),
    ("fac-roma-prati", 80, 0, None),
];

/// (description, billed cents, purchase cost cents, labor cents)
const REPAIRS: &[(&str, i64, i64, i64)] = &[
    ("OLED display", 12000, 7000, 4500),
    ("Battery", 4500, 2000, 2500),
    ("Charging port", 2500, 900, 3000),
    ("Rear glass", 6000, 3500, 4000),
    ("Camera module", 8000, 5200, 3500),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./ripara_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Ripara Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of demo jobs to settle (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./ripara_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, jobs = count, "Seeding ledger database");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    if db.settlements().get_by_job_id(&job_id(0)).await?.is_some() {
        warn!("Demo jobs already present, skipping. Delete the database file to regenerate.");
        return Ok(());
    }

    // Rates
    db.rates().set_platform_rate(CommissionRate::from_percent(20)).await?;
    for (facility, centro, corner, referrer) in FACILITIES {
        db.rates()
            .upsert_facility_rates(&FacilityRates::new(
                *facility,
                CommissionRate::from_percent(*centro),
                CommissionRate::from_percent(*corner),
                referrer.map(str::to_string),
            ))
            .await?;
    }

    // Jobs
    let start = std::time::Instant::now();
    let mut settled = 0;

    for n in 0..count {
        let (facility, _, _, referrer) = FACILITIES[n % FACILITIES.len()];
        let method = if referrer.is_some() && n % 4 == 0 {
            PaymentCollectionMethod::ViaCorner
        } else {
            PaymentCollectionMethod::Direct
        };

        let entry = match db
            .settlements()
            .settle_job(&job_id(n), facility, &demo_quote(n), method)
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(job = n, error = %e, "Failed to settle demo job");
                continue;
            }
        };

        if n % 3 == 0 {
            db.settlements()
                .mark_counterparty_paid(&entry.id, Counterparty::Platform)
                .await?;
        }

        settled += 1;
        if settled % 50 == 0 {
            info!(settled, "Progress");
        }
    }

    info!(settled, elapsed = ?start.elapsed(), "Demo jobs settled");

    // Report what is still owed
    let now = chrono::Utc::now();
    let today = DateRange::new(now - chrono::Duration::days(1), now + chrono::Duration::days(1));
    for (facility, ..) in FACILITIES {
        let due = db.settlements().outstanding(facility, &today).await?;
        info!(
            facility = %facility,
            platform_due = %due.platform_due,
            corner_due = %due.corner_due,
            total_due = %due.total_due,
            open_entries = due.open_entries,
            "Outstanding"
        );
    }

    info!("Seed complete");
    Ok(())
}

fn job_id(n: usize) -> String {
    format!("DEMO-{:05}", n)
}

/// One part, its labor, and a diagnostic service every fifth job.
fn demo_quote(seed: usize) -> Vec<LineItem> {
    let (description, billed, cost, labor) = REPAIRS[seed % REPAIRS.len()];

    let mut items = vec![
        LineItem::part(
            format!("part-{}", seed),
            description,
            1,
            Money::from_cents(billed),
            Money::from_cents(cost),
        ),
        LineItem::labor(
            format!("labor-{}", seed),
            format!("{} replacement", description),
            1,
            Money::from_cents(labor),
        ),
    ];

    if seed % 5 == 0 {
        items.push(LineItem::service(
            format!("svc-{}", seed),
            "Diagnostics",
            1,
            Money::from_cents(1500),
        ));
    }

    items
}
