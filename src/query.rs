// 🔎 Query Service - listings with search, sort and pagination
//
// Stored sorts run in SQLite under the CATALOG collation. Pending deletions
// only own `name` and `submittedDate`; sorting them by the joined record's
// `occupancy` or `type` takes a second, in-memory pass over the joined rows.
// Every item leaves this module with its timestamp rendered for the caller.

use crate::collation::collate;
use crate::db::{self, BUILDING_COLUMNS};
use crate::entities::{Building, BuildingType, Style, Tile};
use crate::error::{FieldError, ModerationError, ModerationResult};
use crate::schema::{validate_search_text, ValidationResult};
use crate::temporal::CallerTimeZone;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

// ============================================================================
// COLLECTIONS + SORT KEYS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Buildings,
    PendingAdditions,
    PendingDeletions,
}

impl Collection {
    pub fn label(&self) -> &'static str {
        match self {
            Collection::Buildings => "buildings",
            Collection::PendingAdditions => "pending additions",
            Collection::PendingDeletions => "pending deletions",
        }
    }

    /// Plain message returned when a listing cannot be produced
    pub fn failure_message(&self) -> &'static str {
        match self {
            Collection::Buildings => "Get buildings failed.",
            Collection::PendingAdditions => "Get pending additions failed.",
            Collection::PendingDeletions => "Get pending deletions failed.",
        }
    }

    pub fn sort_fields(&self) -> &'static [SortField] {
        match self {
            Collection::Buildings | Collection::PendingAdditions => &[
                SortField::Name,
                SortField::Occupancy,
                SortField::Type,
                SortField::LastUpdated,
            ],
            Collection::PendingDeletions => &[
                SortField::Name,
                SortField::Occupancy,
                SortField::Type,
                SortField::SubmittedDate,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Occupancy,
    Type,
    LastUpdated,
    SubmittedDate,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Occupancy => "occupancy",
            SortField::Type => "type",
            SortField::LastUpdated => "lastUpdated",
            SortField::SubmittedDate => "submittedDate",
        }
    }

    /// Parse a wire sort key, accepting only keys valid for `collection`
    pub fn parse_for(collection: Collection, raw: &str) -> Result<SortField, FieldError> {
        collection
            .sort_fields()
            .iter()
            .copied()
            .find(|f| f.as_str() == raw)
            .ok_or_else(|| FieldError::new("sortBy", "Invalid sort."))
    }

    /// ORDER BY term for building-shaped tables
    fn building_order(&self) -> &'static str {
        match self {
            SortField::Name => "name COLLATE CATALOG",
            SortField::Occupancy => "occupancy",
            SortField::Type => "type COLLATE CATALOG",
            SortField::LastUpdated | SortField::SubmittedDate => "last_updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(raw: &str) -> Result<SortDir, FieldError> {
        match raw {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            _ => Err(FieldError::new("sortDir", "Must be asc or desc.")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }

    fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    }
}

// ============================================================================
// LIST QUERY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub sort_by: SortField,
    pub sort_dir: SortDir,
    pub skip: u64,
    /// None means unbounded
    pub limit: Option<u64>,
    pub search_text: Option<String>,
}

impl ListQuery {
    pub fn new(sort_by: SortField, sort_dir: SortDir) -> Self {
        ListQuery {
            sort_by,
            sort_dir,
            skip: 0,
            limit: None,
            search_text: None,
        }
    }

    /// Validate raw path/query parameters, first error per field.
    /// Blank optional parameters count as absent.
    pub fn parse(
        collection: Collection,
        sort_by: &str,
        sort_dir: &str,
        skip: Option<&str>,
        limit: Option<&str>,
        search_text: Option<&str>,
    ) -> ValidationResult<ListQuery> {
        let mut errors = Vec::new();

        let sort_by = SortField::parse_for(collection, sort_by)
            .map_err(|e| errors.push(e))
            .ok();
        let sort_dir = SortDir::parse(sort_dir).map_err(|e| errors.push(e)).ok();

        let skip = match skip.map(str::trim).filter(|s| !s.is_empty()) {
            None => Some(0),
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| errors.push(FieldError::new("skip", "Invalid skip.")))
                .ok(),
        };
        let limit = match limit.map(str::trim).filter(|s| !s.is_empty()) {
            None => Some(None),
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n >= 1 => Some(Some(n)),
                _ => {
                    errors.push(FieldError::new("limit", "Invalid limit."));
                    None
                }
            },
        };
        let search_text = validate_search_text(search_text)
            .map_err(|e| errors.push(e))
            .ok();

        match (sort_by, sort_dir, skip, limit, search_text) {
            (Some(sort_by), Some(sort_dir), Some(skip), Some(limit), Some(search_text))
                if errors.is_empty() =>
            {
                Ok(ListQuery {
                    sort_by,
                    sort_dir,
                    skip,
                    limit,
                    search_text,
                })
            }
            _ => Err(errors),
        }
    }

    fn sql_limit(&self) -> i64 {
        self.limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1)
    }

    fn sql_offset(&self) -> i64 {
        i64::try_from(self.skip).unwrap_or(i64::MAX)
    }
}

// ============================================================================
// VIEWS (timestamps rendered)
// ============================================================================

/// A building as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingView {
    pub id: String,
    pub name: String,
    pub occupancy: u16,
    #[serde(rename = "type")]
    pub building_type: BuildingType,
    pub tiles: BTreeSet<Tile>,
    pub style: Style,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl BuildingView {
    pub fn render(building: Building, tz: &CallerTimeZone, with_image: bool) -> Self {
        BuildingView {
            last_updated: tz.render(building.last_updated).to_string(),
            image: with_image.then_some(building.image),
            id: building.id,
            name: building.name,
            occupancy: building.occupancy,
            building_type: building.building_type,
            tiles: building.tiles,
            style: building.style,
        }
    }
}

/// A pending deletion with its target record joined in.
/// `building` is None when the referenced record no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingDeletionView {
    pub building: Option<BuildingView>,
    pub name: String,
    #[serde(rename = "submittedDate")]
    pub submitted_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Listing {
    Buildings(Vec<BuildingView>),
    PendingDeletions(Vec<PendingDeletionView>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Listing::Buildings(items) => items.len(),
            Listing::PendingDeletions(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// LISTINGS
// ============================================================================

pub fn list(
    conn: &Connection,
    collection: Collection,
    query: &ListQuery,
    tz: &CallerTimeZone,
) -> ModerationResult<Listing> {
    debug!(
        collection = collection.label(),
        sort_by = query.sort_by.as_str(),
        sort_dir = query.sort_dir.as_str(),
        skip = query.skip,
        limit = ?query.limit,
        search = ?query.search_text,
        "Listing"
    );

    match collection {
        Collection::Buildings => list_buildings(conn, query, tz).map(Listing::Buildings),
        Collection::PendingAdditions => {
            list_pending_additions(conn, query, tz).map(Listing::Buildings)
        }
        Collection::PendingDeletions => {
            list_pending_deletions(conn, query, tz).map(Listing::PendingDeletions)
        }
    }
}

fn list_building_table(
    conn: &Connection,
    table: &str,
    query: &ListQuery,
) -> ModerationResult<Vec<Building>> {
    let dir = query.sort_dir.sql();
    let sql = format!(
        "SELECT {cols} FROM {table}
         WHERE ?1 IS NULL OR instr(lower(name), lower(?1)) > 0
         ORDER BY {order} {dir}, name COLLATE CATALOG {dir}, row_id {dir}
         LIMIT ?2 OFFSET ?3",
        cols = BUILDING_COLUMNS,
        table = table,
        order = query.sort_by.building_order(),
        dir = dir,
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![query.search_text, query.sql_limit(), query.sql_offset()],
            db::stored_building,
        )?
        .map(|r| r.map(|s| s.building))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn list_buildings(
    conn: &Connection,
    query: &ListQuery,
    tz: &CallerTimeZone,
) -> ModerationResult<Vec<BuildingView>> {
    Ok(list_building_table(conn, "buildings", query)?
        .into_iter()
        .map(|b| BuildingView::render(b, tz, true))
        .collect())
}

/// Proposals are listed without their images
pub fn list_pending_additions(
    conn: &Connection,
    query: &ListQuery,
    tz: &CallerTimeZone,
) -> ModerationResult<Vec<BuildingView>> {
    Ok(list_building_table(conn, "pending_additions", query)?
        .into_iter()
        .map(|b| BuildingView::render(b, tz, false))
        .collect())
}

struct JoinedDeletion {
    name: String,
    submitted_date: chrono::DateTime<chrono::Utc>,
    building: Option<Building>,
}

fn joined_deletion(row: &Row) -> rusqlite::Result<JoinedDeletion> {
    let joined_key: Option<i64> = row.get(3)?;
    let building = match joined_key {
        Some(_) => Some(db::stored_building_at(row, 3)?.building),
        None => None,
    };

    Ok(JoinedDeletion {
        name: row.get(1)?,
        submitted_date: db::timestamp_column(row, 2)?,
        building,
    })
}

/// Second pass for keys the deletion does not own. Joined rows compare by
/// the record's key then name; orphans go last.
fn resort_joined(rows: &mut [JoinedDeletion], field: SortField, dir: SortDir) {
    rows.sort_by(|a, b| match (&a.building, &b.building) {
        (Some(x), Some(y)) => {
            let primary = match field {
                SortField::Occupancy => x.occupancy.cmp(&y.occupancy),
                _ => collate(x.building_type.as_str(), y.building_type.as_str()),
            };
            dir.apply(primary.then_with(|| collate(&x.name, &y.name)))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => dir.apply(collate(&a.name, &b.name)),
    });
}

pub fn list_pending_deletions(
    conn: &Connection,
    query: &ListQuery,
    tz: &CallerTimeZone,
) -> ModerationResult<Vec<PendingDeletionView>> {
    let dir = query.sort_dir.sql();
    let stored_order = match query.sort_by {
        SortField::SubmittedDate | SortField::LastUpdated => {
            format!("d.submitted_date {dir}, d.name COLLATE CATALOG {dir}", dir = dir)
        }
        _ => format!("d.name COLLATE CATALOG {dir}", dir = dir),
    };
    let joined_cols = BUILDING_COLUMNS
        .split(", ")
        .map(|c| format!("b.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT d.building_ref, d.name, d.submitted_date, {joined}
         FROM pending_deletions d
         LEFT JOIN buildings b ON b.row_id = d.building_ref
         WHERE ?1 IS NULL OR instr(lower(d.name), lower(?1)) > 0
         ORDER BY {order}, d.row_id {dir}",
        joined = joined_cols,
        order = stored_order,
        dir = dir,
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(params![query.search_text], joined_deletion)?
        .collect::<Result<Vec<_>, _>>()?;

    if matches!(query.sort_by, SortField::Occupancy | SortField::Type) {
        resort_joined(&mut rows, query.sort_by, query.sort_dir);
    }

    let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
    let limit = query
        .limit
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);

    Ok(rows
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|d| PendingDeletionView {
            building: d.building.map(|b| BuildingView::render(b, tz, true)),
            name: d.name,
            submitted_date: tz.render(d.submitted_date).to_string(),
        })
        .collect())
}

// ============================================================================
// SINGLE READS
// ============================================================================

pub fn get_building(
    conn: &Connection,
    id: &str,
    tz: &CallerTimeZone,
) -> ModerationResult<BuildingView> {
    let stored = db::find_building_by_id(conn, id)?
        .ok_or_else(|| ModerationError::not_found(format!("building {}", id)))?;
    Ok(BuildingView::render(stored.building, tz, true))
}

pub fn get_pending_addition(
    conn: &Connection,
    id: &str,
    tz: &CallerTimeZone,
) -> ModerationResult<BuildingView> {
    let pending = db::find_pending_addition_by_id(conn, id)?
        .ok_or_else(|| ModerationError::not_found(format!("pending addition {}", id)))?;
    Ok(BuildingView::render(pending, tz, true))
}

// ============================================================================
// TESTS
// ============================================================================
