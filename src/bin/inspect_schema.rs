//! Utility to inspect the database schema and print the platform tables.

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;

/// Tables the API reads and writes.
const PLATFORM_TABLES: [&str; 9] = [
    "profiles",
    "user_roles",
    "energy_bills",
    "open_finance_connections",
    "credit_analysis",
    "credit_analysis_history",
    "energy_tokens",
    "token_transactions",
    "cooperative_terms",
];

/// Main entry point for the schema inspection utility.
///
/// Connects to the database, lists columns for each platform table and reports
/// the ones that are missing.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let database_url =
        env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;

    let mut missing = Vec::new();
    for table in PLATFORM_TABLES {
        let columns: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name, data_type FROM information_schema.columns WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position"
        )
        .bind(table)
        .fetch_all(&pool)
        .await?;

        if columns.is_empty() {
            missing.push(table);
            continue;
        }

        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&pool)
            .await?;

        println!("- {} ({} rows)", table, rows);
        for (col, type_) in columns {
            println!("  - {}: {}", col, type_);
        }
        println!();
    }

    if missing.is_empty() {
        println!("All {} platform tables present.", PLATFORM_TABLES.len());
    } else {
        println!("Missing tables: {}", missing.join(", "));
    }

    Ok(())
}
