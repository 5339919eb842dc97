// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use building_catalog::config::{init_tracing, StoreArgs};
use building_catalog::{catalog_counts, load_csv, open_catalog, seed_buildings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Building catalog operator tools
#[derive(Parser, Debug)]
#[command(name = "building-catalog")]
#[command(about = "Seed and browse the building catalog")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed the live catalog from a CSV file (id?,name,occupancy,type,tiles,style)
    Import {
        csv: PathBuf,
    },
    /// Read-only console over the catalog and both proposal queues (default)
    Browse {
        /// Render timestamps at this offset, minutes east of UTC
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        tz_offset: i32,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Some(Command::Import { csv }) => run_import(&cli.store, &csv),
        Some(Command::Browse { tz_offset }) => run_ui_mode(&cli.store, tz_offset),
        None => run_ui_mode(&cli.store, 0),
    }
}

fn run_import(store: &StoreArgs, csv_path: &std::path::Path) -> Result<()> {
    println!("🗄️  Seed Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let rows = load_csv(csv_path)?;
    println!("✓ Loaded {} rows from {:?}", rows.len(), csv_path);

    // 2. Setup database
    println!("\n🔧 Opening catalog...");
    let conn = open_catalog(&store.db_path)?;
    println!("✓ Catalog ready at {:?}", store.db_path);

    // 3. Insert buildings
    println!("\n💾 Inserting buildings...");
    let report = seed_buildings(&conn, &rows, chrono::Utc::now()).context("Seed import failed")?;

    for (line, errors) in &report.rejected {
        let reasons = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        println!("  ✗ row {}: {}", line, reasons);
    }

    // 4. Verify count
    let counts = catalog_counts(&conn)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Inserted:   {}", report.inserted);
    println!("✓ Duplicates: {}", report.duplicates);
    println!("✓ Rejected:   {}", report.rejected.len());
    println!("✓ Catalog now holds {} buildings", counts.buildings);

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(store: &StoreArgs, tz_offset: i32) -> Result<()> {
    use building_catalog::CallerTimeZone;

    if !store.db_path.exists() {
        eprintln!("❌ Catalog not found at {:?}", store.db_path);
        eprintln!("   Run: building-catalog import <csv>");
        eprintln!("   or start the server once to create it.");
        std::process::exit(1);
    }

    let tz = CallerTimeZone::from_offset_minutes(tz_offset)
        .with_context(|| format!("Timezone offset out of range: {}", tz_offset))?;
    let conn = open_catalog(&store.db_path)?;

    let mut app = ui::App::new(conn, tz)?;
    ui::run_ui(&mut app)?;

    println!("\n✅ Console closed");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_store: &StoreArgs, _tz_offset: i32) -> Result<()> {
    eprintln!("❌ Console not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin catalog-server --features server");
    std::process::exit(1);
}
