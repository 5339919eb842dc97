// 🗄️ Catalog Store - SQLite (WAL) tables for live records and proposals
//
// Three collections:
// - buildings:          live catalog, unique by `id`
// - pending_additions:  proposals, unique by `name` AND by `id`
// - pending_deletions:  proposals, unique by `building_ref` (a buildings.row_id)
//
// Every "at most one open proposal per subject" rule is a UNIQUE constraint,
// and every find-then-write is a single upsert statement against it.

use crate::collation::{collate, COLLATION_NAME};
use crate::entities::{Building, BuildingType, PendingAddition, PendingDeletion, Style, Tile};
use crate::error::{FieldError, ModerationResult};
use crate::schema::{validate_fields, validate_id, RawFields};
use crate::temporal::{from_stored, to_stored};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Column list shared by both building-shaped tables
pub(crate) const BUILDING_COLUMNS: &str =
    "row_id, id, name, occupancy, type, tiles, style, last_updated, image";

/// A building together with its storage key
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBuilding {
    /// `row_id` - the stable reference a PendingDeletion points at
    pub key: i64,
    pub building: Building,
}

// ============================================================================
// SETUP
// ============================================================================

/// Open (or create) the catalog database file and prepare it for use
pub fn open_catalog(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open catalog database {:?}", path))?;
    setup_database(&conn).context("Failed to initialize catalog schema")?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Sort order for names and type codes
    conn.create_collation(COLLATION_NAME, collate)?;

    // ==========================================================================
    // Live catalog
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS buildings (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            occupancy INTEGER NOT NULL CHECK (occupancy BETWEEN 1 AND 9999),
            type TEXT NOT NULL,
            tiles TEXT NOT NULL,
            style TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            image TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    // ==========================================================================
    // Pending additions (same shape, one per name)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pending_additions (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            name TEXT UNIQUE NOT NULL,
            occupancy INTEGER NOT NULL CHECK (occupancy BETWEEN 1 AND 9999),
            type TEXT NOT NULL,
            tiles TEXT NOT NULL,
            style TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            image TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    // ==========================================================================
    // Pending deletions (one per referenced building)
    // No foreign key: the reference outlives the building if an approval is
    // interrupted, and that orphan must stay visible.
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pending_deletions (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            building_ref INTEGER UNIQUE NOT NULL,
            name TEXT NOT NULL,
            submitted_date TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Moderation events (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS moderation_events (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_buildings_name ON buildings(name COLLATE CATALOG)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_subject ON moderation_events(subject_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn parse_column<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    from_stored(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp: {}", raw)))
}

/// Map a row selected with `BUILDING_COLUMNS` starting at `offset`
pub(crate) fn stored_building_at(row: &Row, offset: usize) -> rusqlite::Result<StoredBuilding> {
    let tiles_json: String = row.get(offset + 5)?;
    let tiles: BTreeSet<Tile> =
        serde_json::from_str(&tiles_json).map_err(|e| conversion_error(offset + 5, e))?;

    Ok(StoredBuilding {
        key: row.get(offset)?,
        building: Building {
            id: row.get(offset + 1)?,
            name: row.get(offset + 2)?,
            occupancy: row.get(offset + 3)?,
            building_type: parse_column::<BuildingType>(row, offset + 4)?,
            tiles,
            style: parse_column::<Style>(row, offset + 6)?,
            last_updated: timestamp_column(row, offset + 7)?,
            image: row.get(offset + 8)?,
        },
    })
}

pub(crate) fn stored_building(row: &Row) -> rusqlite::Result<StoredBuilding> {
    stored_building_at(row, 0)
}

fn pending_deletion(row: &Row) -> rusqlite::Result<PendingDeletion> {
    Ok(PendingDeletion {
        building_ref: row.get(0)?,
        name: row.get(1)?,
        submitted_date: timestamp_column(row, 2)?,
    })
}

fn tiles_json(tiles: &BTreeSet<Tile>) -> ModerationResult<String> {
    Ok(serde_json::to_string(tiles)?)
}

// ============================================================================
// LIVE BUILDINGS
// ============================================================================

pub fn find_building_by_id(conn: &Connection, id: &str) -> ModerationResult<Option<StoredBuilding>> {
    let sql = format!("SELECT {} FROM buildings WHERE id = ?1", BUILDING_COLUMNS);
    Ok(conn.query_row(&sql, [id], stored_building).optional()?)
}

/// Names are not unique in the live catalog; the oldest record wins
pub fn find_building_by_name(
    conn: &Connection,
    name: &str,
) -> ModerationResult<Option<StoredBuilding>> {
    let sql = format!(
        "SELECT {} FROM buildings WHERE name = ?1 ORDER BY row_id LIMIT 1",
        BUILDING_COLUMNS
    );
    Ok(conn.query_row(&sql, [name], stored_building).optional()?)
}

/// Create the record, or overwrite every mutable field of the record with the
/// same `id`. An empty incoming image keeps the stored one.
pub fn upsert_building(conn: &Connection, building: &Building) -> ModerationResult<StoredBuilding> {
    let sql = format!(
        "INSERT INTO buildings (id, name, occupancy, type, tiles, style, last_updated, image)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            occupancy = excluded.occupancy,
            type = excluded.type,
            tiles = excluded.tiles,
            style = excluded.style,
            last_updated = excluded.last_updated,
            image = CASE WHEN excluded.image <> '' THEN excluded.image ELSE buildings.image END
         RETURNING {}",
        BUILDING_COLUMNS
    );

    let stored = conn.query_row(
        &sql,
        params![
            building.id,
            building.name,
            building.occupancy,
            building.building_type.as_str(),
            tiles_json(&building.tiles)?,
            building.style.as_str(),
            to_stored(building.last_updated),
            building.image,
        ],
        stored_building,
    )?;

    Ok(stored)
}

/// Plain insert; returns false when a record with this `id` already exists
pub fn insert_building(conn: &Connection, building: &Building) -> ModerationResult<bool> {
    let result = conn.execute(
        "INSERT INTO buildings (id, name, occupancy, type, tiles, style, last_updated, image)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            building.id,
            building.name,
            building.occupancy,
            building.building_type.as_str(),
            tiles_json(&building.tiles)?,
            building.style.as_str(),
            to_stored(building.last_updated),
            building.image,
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn delete_building_by_id(
    conn: &Connection,
    id: &str,
) -> ModerationResult<Option<StoredBuilding>> {
    let sql = format!("DELETE FROM buildings WHERE id = ?1 RETURNING {}", BUILDING_COLUMNS);
    Ok(conn.query_row(&sql, [id], stored_building).optional()?)
}

// ============================================================================
// PENDING ADDITIONS
// ============================================================================

pub fn find_pending_addition_by_id(
    conn: &Connection,
    id: &str,
) -> ModerationResult<Option<PendingAddition>> {
    let sql = format!("SELECT {} FROM pending_additions WHERE id = ?1", BUILDING_COLUMNS);
    let found = conn.query_row(&sql, [id], stored_building).optional()?;
    Ok(found.map(|s| s.building))
}

/// Create the proposal for `addition.name`, or merge into the open one.
///
/// On merge: fields are overwritten, the stored `id` is replaced only when
/// `inherit_id` is set (the proposal matched a live record), and an empty
/// incoming image keeps the previously uploaded one.
pub fn upsert_pending_addition(
    conn: &Connection,
    addition: &PendingAddition,
    inherit_id: bool,
) -> ModerationResult<PendingAddition> {
    let sql = format!(
        "INSERT INTO pending_additions (id, name, occupancy, type, tiles, style, last_updated, image)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(name) DO UPDATE SET
            id = CASE WHEN ?9 THEN excluded.id ELSE pending_additions.id END,
            occupancy = excluded.occupancy,
            type = excluded.type,
            tiles = excluded.tiles,
            style = excluded.style,
            last_updated = excluded.last_updated,
            image = CASE WHEN excluded.image <> '' THEN excluded.image ELSE pending_additions.image END
         RETURNING {}",
        BUILDING_COLUMNS
    );

    let stored = conn.query_row(
        &sql,
        params![
            addition.id,
            addition.name,
            addition.occupancy,
            addition.building_type.as_str(),
            tiles_json(&addition.tiles)?,
            addition.style.as_str(),
            to_stored(addition.last_updated),
            addition.image,
            inherit_id,
        ],
        stored_building,
    )?;

    Ok(stored.building)
}

pub fn delete_pending_addition_by_id(
    conn: &Connection,
    id: &str,
) -> ModerationResult<Option<PendingAddition>> {
    let sql = format!(
        "DELETE FROM pending_additions WHERE id = ?1 RETURNING {}",
        BUILDING_COLUMNS
    );
    let removed = conn.query_row(&sql, [id], stored_building).optional()?;
    Ok(removed.map(|s| s.building))
}

// ============================================================================
// PENDING DELETIONS
// ============================================================================

/// Create the deletion proposal for a building, or refresh the open one
pub fn upsert_pending_deletion(
    conn: &Connection,
    deletion: &PendingDeletion,
) -> ModerationResult<PendingDeletion> {
    let stored = conn.query_row(
        "INSERT INTO pending_deletions (building_ref, name, submitted_date)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(building_ref) DO UPDATE SET
            name = excluded.name,
            submitted_date = excluded.submitted_date
         RETURNING building_ref, name, submitted_date",
        params![
            deletion.building_ref,
            deletion.name,
            to_stored(deletion.submitted_date),
        ],
        pending_deletion,
    )?;

    Ok(stored)
}

pub fn delete_pending_deletion_by_ref(
    conn: &Connection,
    building_ref: i64,
) -> ModerationResult<Option<PendingDeletion>> {
    Ok(conn
        .query_row(
            "DELETE FROM pending_deletions WHERE building_ref = ?1
             RETURNING building_ref, name, submitted_date",
            [building_ref],
            pending_deletion,
        )
        .optional()?)
}

// ============================================================================
// COUNTS
// ============================================================================

/// Row counts of the three collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub buildings: i64,
    pub pending_additions: i64,
    pub pending_deletions: i64,
}

pub fn catalog_counts(conn: &Connection) -> ModerationResult<CatalogCounts> {
    let count = |table: &str| -> rusqlite::Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
    };

    Ok(CatalogCounts {
        buildings: count("buildings")?,
        pending_additions: count("pending_additions")?,
        pending_deletions: count("pending_deletions")?,
    })
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AdditionSubmitted,
    AdditionApproved,
    AdditionRejected,
    DeletionSubmitted,
    DeletionApproved,
    DeletionRejected,
    /// Building deleted but its pending deletion was already gone
    OrphanedDeletion,
    SeedImported,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AdditionSubmitted => "addition_submitted",
            EventKind::AdditionApproved => "addition_approved",
            EventKind::AdditionRejected => "addition_rejected",
            EventKind::DeletionSubmitted => "deletion_submitted",
            EventKind::DeletionApproved => "deletion_approved",
            EventKind::DeletionRejected => "deletion_rejected",
            EventKind::OrphanedDeletion => "orphaned_deletion",
            EventKind::SeedImported => "seed_imported",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("Unknown event kind: {}", s))
    }
}

/// One moderation transition ("every change is an event")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    /// Building id the transition concerned
    pub subject_id: String,
    pub subject_name: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl ModerationEvent {
    pub fn new(
        kind: EventKind,
        building: &Building,
        data: serde_json::Value,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            kind,
            subject_id: building.id.clone(),
            subject_name: building.name.clone(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_event(conn: &Connection, event: &ModerationEvent) -> ModerationResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO moderation_events (
            event_id, timestamp, event_type, subject_id, subject_name, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            to_stored(event.timestamp),
            event.kind.as_str(),
            event.subject_id,
            event.subject_name,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one building id, newest first
pub fn get_events_for_subject(
    conn: &Connection,
    subject_id: &str,
) -> ModerationResult<Vec<ModerationEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, subject_id, subject_name, data, actor
         FROM moderation_events
         WHERE subject_id = ?1
         ORDER BY timestamp DESC, row_id DESC",
    )?;

    let events = stmt
        .query_map([subject_id], |row| {
            let data_json: String = row.get(5)?;
            Ok(ModerationEvent {
                event_id: row.get(0)?,
                timestamp: timestamp_column(row, 1)?,
                kind: parse_column::<EventKind>(row, 2)?,
                subject_id: row.get(3)?,
                subject_name: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SEED IMPORT (CSV)
// ============================================================================

/// One CSV row: `id,name,occupancy,type,tiles,style` (id may be blank)
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRow {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub occupancy: String,
    #[serde(rename = "type")]
    pub building_type: String,
    /// Space- or semicolon-separated footprint codes
    pub tiles: String,
    pub style: String,
}

impl SeedRow {
    fn raw_fields(&self) -> RawFields {
        RawFields {
            name: self.name.clone(),
            occupancy: self.occupancy.clone(),
            building_type: self.building_type.clone(),
            tiles: self
                .tiles
                .split(|c: char| c == ';' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            style: self.style.clone(),
        }
    }

    /// Validate into a building stamped at `now`
    pub fn to_building(&self, now: DateTime<Utc>) -> Result<Building, Vec<FieldError>> {
        let fields = validate_fields(&self.raw_fields())?;
        match self.id.as_deref().map(str::trim) {
            None | Some("") => Ok(Building::new(fields, now)),
            Some(id) => {
                let id = validate_id(id).map_err(|e| vec![e])?;
                Ok(Building::with_id(id, fields, now))
            }
        }
    }
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<SeedRow>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: SeedRow = result.context("Failed to deserialize seed row")?;
        rows.push(row);
    }

    Ok(rows)
}

/// Outcome of a seed import
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub inserted: usize,
    pub duplicates: usize,
    /// (1-based data line, errors)
    pub rejected: Vec<(usize, Vec<FieldError>)>,
}

/// Insert seed rows straight into the live catalog. Invalid rows are
/// reported and skipped, rows whose id already exists are counted as
/// duplicates.
pub fn seed_buildings(
    conn: &Connection,
    rows: &[SeedRow],
    now: DateTime<Utc>,
) -> ModerationResult<SeedReport> {
    let mut report = SeedReport::default();

    for (i, row) in rows.iter().enumerate() {
        let building = match row.to_building(now) {
            Ok(b) => b,
            Err(errors) => {
                debug!(line = i + 1, name = %row.name, "Rejected seed row");
                report.rejected.push((i + 1, errors));
                continue;
            }
        };

        if insert_building(conn, &building)? {
            report.inserted += 1;
            let event = ModerationEvent::new(
                EventKind::SeedImported,
                &building,
                serde_json::json!({ "line": i + 1 }),
                "seed_importer",
                now,
            );
            insert_event(conn, &event)?;
        } else {
            report.duplicates += 1;
        }
    }

    info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected.len(),
        "Seed import finished"
    );

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::entities::BuildingFields;
    use chrono::TimeZone;

    pub(crate) fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    pub(crate) fn fields(name: &str, occupancy: u16, building_type: BuildingType) -> BuildingFields {
        BuildingFields {
            name: name.to_string(),
            occupancy,
            building_type,
            tiles: [Tile::T1x1].into_iter().collect(),
            style: Style::Unstyled,
        }
    }

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_upsert_building_creates_then_overwrites() {
        let conn = test_conn();
        let mut building = Building::new(fields("Tower One", 100, BuildingType::ResidentialHigh), at(0));
        building.image = "aW1hZ2U=".to_string();

        let created = upsert_building(&conn, &building).unwrap();
        assert_eq!(created.building, building);

        let mut update = building.clone();
        update.occupancy = 250;
        update.image = String::new();
        update.last_updated = at(60);
        let updated = upsert_building(&conn, &update).unwrap();

        // Same row, new values, image kept
        assert_eq!(updated.key, created.key);
        assert_eq!(updated.building.occupancy, 250);
        assert_eq!(updated.building.image, "aW1hZ2U=");
        assert_eq!(updated.building.last_updated, at(60));
        assert_eq!(catalog_counts(&conn).unwrap().buildings, 1);
    }

    #[test]
    fn test_pending_addition_unique_by_name() {
        let conn = test_conn();
        let first = Building::new(fields("Corner Shop", 10, BuildingType::CommercialServiceLow), at(0));
        let stored = upsert_pending_addition(&conn, &first, false).unwrap();
        assert_eq!(stored.id, first.id);

        // Same name, fresh id, no inheritance: keeps the first id
        let second = Building::new(fields("Corner Shop", 20, BuildingType::CommercialServiceMedium), at(10));
        let merged = upsert_pending_addition(&conn, &second, false).unwrap();

        assert_eq!(merged.id, first.id);
        assert_eq!(merged.occupancy, 20);
        assert_eq!(merged.building_type, BuildingType::CommercialServiceMedium);
        assert_eq!(catalog_counts(&conn).unwrap().pending_additions, 1);
    }

    #[test]
    fn test_pending_addition_id_inherited_when_requested() {
        let conn = test_conn();
        let first = Building::new(fields("Depot", 10, BuildingType::DirtyIndustry), at(0));
        upsert_pending_addition(&conn, &first, false).unwrap();

        let live_id = "2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10".to_string();
        let second = Building::with_id(live_id.clone(), fields("Depot", 12, BuildingType::DirtyIndustry), at(5));
        let merged = upsert_pending_addition(&conn, &second, true).unwrap();

        assert_eq!(merged.id, live_id);
        assert!(find_pending_addition_by_id(&conn, &first.id).unwrap().is_none());
    }

    #[test]
    fn test_pending_deletion_refresh_not_duplicate() {
        let conn = test_conn();
        let building = upsert_building(
            &conn,
            &Building::new(fields("Old Mill", 40, BuildingType::Manufacturing), at(0)),
        )
        .unwrap();

        upsert_pending_deletion(&conn, &PendingDeletion::new(building.key, "Old Mill".into(), at(1))).unwrap();
        let refreshed =
            upsert_pending_deletion(&conn, &PendingDeletion::new(building.key, "Old Mill".into(), at(99))).unwrap();

        assert_eq!(refreshed.submitted_date, at(99));
        assert_eq!(catalog_counts(&conn).unwrap().pending_deletions, 1);
    }

    #[test]
    fn test_delete_returns_removed_row() {
        let conn = test_conn();
        let building = Building::new(fields("Barn", 5, BuildingType::Agriculture), at(0));
        upsert_building(&conn, &building).unwrap();

        let removed = delete_building_by_id(&conn, &building.id).unwrap().unwrap();
        assert_eq!(removed.building.name, "Barn");
        assert!(delete_building_by_id(&conn, &building.id).unwrap().is_none());
    }

    #[test]
    fn test_event_log() {
        let conn = test_conn();
        let building = Building::new(fields("Barn", 5, BuildingType::Agriculture), at(0));

        let event = ModerationEvent::new(
            EventKind::AdditionSubmitted,
            &building,
            serde_json::json!({ "occupancy": 5 }),
            "alice",
            at(3),
        );
        insert_event(&conn, &event).unwrap();

        let events = get_events_for_subject(&conn, &building.id).unwrap();
        assert_eq!(events, vec![event]);
    }

    #[test]
    fn test_seed_import_skips_invalid_and_duplicates() {
        let conn = test_conn();
        let rows = vec![
            SeedRow {
                id: Some("2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10".into()),
                name: "Farm".into(),
                occupancy: "12".into(),
                building_type: "I-AG".into(),
                tiles: "1x1;2x2".into(),
                style: "None".into(),
            },
            SeedRow {
                id: Some("2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10".into()),
                name: "Farm again".into(),
                occupancy: "12".into(),
                building_type: "I-AG".into(),
                tiles: "1x1".into(),
                style: "None".into(),
            },
            SeedRow {
                id: None,
                name: "Bad".into(),
                occupancy: "0".into(),
                building_type: "I-AG".into(),
                tiles: "1x1".into(),
                style: "None".into(),
            },
        ];

        let report = seed_buildings(&conn, &rows, at(0)).unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, 3);

        let farm = find_building_by_id(&conn, "2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10").unwrap().unwrap();
        assert_eq!(farm.building.tiles.len(), 2);
    }
}
