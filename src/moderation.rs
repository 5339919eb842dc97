// ⚖️ Moderation Engine - proposal state machine
//
// Submissions create or merge proposals; approvals and rejections consume
// them. Live records change only through `approve_addition` and
// `approve_deletion`.
//
// Every function here assumes the Verification Gate already accepted the
// request, and takes the gate's time of check as `now`.

use crate::db::{self, EventKind, ModerationEvent, StoredBuilding};
use crate::entities::{Building, PendingAddition, PendingDeletion};
use crate::error::{ModerationError, ModerationResult};
use crate::schema::AdditionSubmission;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use tracing::{error, info};

pub const ADDITION_ACCEPTED: &str = "Addition awaiting approval!";
pub const DELETION_ACCEPTED: &str = "Deletion awaiting approval!";

fn record(
    conn: &Connection,
    kind: EventKind,
    building: &Building,
    data: serde_json::Value,
    actor: &str,
    now: DateTime<Utc>,
) -> ModerationResult<()> {
    db::insert_event(conn, &ModerationEvent::new(kind, building, data, actor, now))
}

// ============================================================================
// ADDITIONS
// ============================================================================

/// Propose a new building or an update to an existing one.
///
/// The proposal is matched to a live record by `id` when one was supplied,
/// otherwise by `name`. A matched record lends its `id` and, when nothing was
/// uploaded, its image. At most one proposal exists per name: a later
/// submission for the same name overwrites the open one.
pub fn submit_addition(
    conn: &Connection,
    submission: &AdditionSubmission,
    uploaded_image: Option<String>,
    now: DateTime<Utc>,
    actor: &str,
) -> ModerationResult<PendingAddition> {
    let existing = match &submission.id {
        Some(id) => db::find_building_by_id(conn, id)?,
        None => db::find_building_by_name(conn, &submission.fields.name)?,
    };

    let mut proposal = match &existing {
        Some(stored) => Building::with_id(stored.building.id.clone(), submission.fields.clone(), now),
        None => Building::new(submission.fields.clone(), now),
    };

    // upload > matched record's image > (kept by the upsert) previous upload
    proposal.image = uploaded_image
        .filter(|image| !image.is_empty())
        .or_else(|| existing.as_ref().map(|s| s.building.image.clone()))
        .unwrap_or_default();

    let stored = db::upsert_pending_addition(conn, &proposal, existing.is_some())?;

    record(
        conn,
        EventKind::AdditionSubmitted,
        &stored,
        json!({
            "matchedRecord": existing.is_some(),
            "occupancy": stored.occupancy,
            "type": stored.building_type,
        }),
        actor,
        now,
    )?;

    info!(id = %stored.id, name = %stored.name, matched = existing.is_some(), "Addition submitted");
    Ok(stored)
}

/// Publish the proposal with this `id`: create the live record, or
/// overwrite the one with the same `id` (keeping its image when the
/// proposal has none).
///
/// Removing the proposal and writing the record are two statements. If the
/// second fails the proposal is already gone; the failure is logged and
/// returned without compensation.
pub fn approve_addition(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
    actor: &str,
) -> ModerationResult<StoredBuilding> {
    let mut proposal = db::delete_pending_addition_by_id(conn, id)?
        .ok_or_else(|| ModerationError::not_found(format!("pending addition {}", id)))?;

    proposal.last_updated = now;
    let published = db::upsert_building(conn, &proposal).map_err(|e| {
        error!(id = %id, name = %proposal.name, error = %e, "Approved addition lost: record write failed");
        e
    })?;

    record(
        conn,
        EventKind::AdditionApproved,
        &published.building,
        json!({ "key": published.key }),
        actor,
        now,
    )?;

    info!(id = %id, name = %published.building.name, "Addition approved");
    Ok(published)
}

/// Reject the proposal with this `id`. No live record changes.
pub fn remove_addition(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
    actor: &str,
) -> ModerationResult<PendingAddition> {
    let removed = db::delete_pending_addition_by_id(conn, id)?
        .ok_or_else(|| ModerationError::not_found(format!("pending addition {}", id)))?;

    record(conn, EventKind::AdditionRejected, &removed, json!({}), actor, now)?;

    info!(id = %id, name = %removed.name, "Addition rejected");
    Ok(removed)
}

// ============================================================================
// DELETIONS
// ============================================================================

/// Propose deleting the live record with this `id`. Resubmitting refreshes
/// the open proposal's timestamp.
pub fn submit_deletion(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
    actor: &str,
) -> ModerationResult<PendingDeletion> {
    let target = db::find_building_by_id(conn, id)?
        .ok_or_else(|| ModerationError::not_found(format!("building {}", id)))?;

    let deletion = db::upsert_pending_deletion(
        conn,
        &PendingDeletion::new(target.key, target.building.name.clone(), now),
    )?;

    record(
        conn,
        EventKind::DeletionSubmitted,
        &target.building,
        json!({ "key": target.key }),
        actor,
        now,
    )?;

    info!(id = %id, name = %deletion.name, "Deletion submitted");
    Ok(deletion)
}

/// Delete the live record with this `id`, then consume the proposal that
/// referenced it.
///
/// If the record is gone but no proposal references it, the record stays
/// deleted: the fault is logged, recorded as `orphaned_deletion`, and
/// reported as NotFound.
pub fn approve_deletion(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
    actor: &str,
) -> ModerationResult<StoredBuilding> {
    let deleted = db::delete_building_by_id(conn, id)?
        .ok_or_else(|| ModerationError::not_found(format!("building {}", id)))?;

    match db::delete_pending_deletion_by_ref(conn, deleted.key)? {
        Some(_) => {
            record(
                conn,
                EventKind::DeletionApproved,
                &deleted.building,
                json!({ "key": deleted.key }),
                actor,
                now,
            )?;
            info!(id = %id, name = %deleted.building.name, "Deletion approved");
            Ok(deleted)
        }
        None => {
            error!(
                id = %id,
                name = %deleted.building.name,
                key = deleted.key,
                "Record deleted without a pending deletion"
            );
            record(
                conn,
                EventKind::OrphanedDeletion,
                &deleted.building,
                json!({ "key": deleted.key, "record": deleted.building }),
                actor,
                now,
            )?;
            Err(ModerationError::not_found(format!("pending deletion for {}", id)))
        }
    }
}

/// Reject the deletion proposal for the live record with this `id`.
pub fn remove_deletion(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
    actor: &str,
) -> ModerationResult<PendingDeletion> {
    let target = db::find_building_by_id(conn, id)?
        .ok_or_else(|| ModerationError::not_found(format!("building {}", id)))?;

    let removed = db::delete_pending_deletion_by_ref(conn, target.key)?
        .ok_or_else(|| ModerationError::not_found(format!("pending deletion for {}", id)))?;

    record(
        conn,
        EventKind::DeletionRejected,
        &target.building,
        json!({ "key": target.key }),
        actor,
        now,
    )?;

    info!(id = %id, name = %removed.name, "Deletion rejected");
    Ok(removed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{at, fields, test_conn};
    use crate::entities::BuildingType;
    use crate::schema::Proof;

    fn submission(name: &str, occupancy: u16) -> AdditionSubmission {
        AdditionSubmission {
            id: None,
            fields: fields(name, occupancy, BuildingType::CommercialOfficeMedium),
            proof: Proof {
                submitted_at_ms: 0,
                token: "add-token".to_string(),
            },
        }
    }

    fn counts(conn: &Connection) -> (i64, i64, i64) {
        let c = db::catalog_counts(conn).unwrap();
        (c.buildings, c.pending_additions, c.pending_deletions)
    }

    #[test]
    fn test_novel_name_creates_one_proposal_with_fresh_id() {
        let conn = test_conn();
        let pending = submit_addition(&conn, &submission("City Hall", 500), None, at(0), "ann").unwrap();

        assert!(uuid::Uuid::parse_str(&pending.id).is_ok());
        assert_eq!(pending.image, "");
        assert_eq!(counts(&conn), (0, 1, 0));
    }

    #[test]
    fn test_resubmission_overwrites_open_proposal() {
        let conn = test_conn();
        let first = submit_addition(&conn, &submission("City Hall", 500), Some("Zmlyc3Q=".into()), at(0), "ann").unwrap();
        let second = submit_addition(&conn, &submission("City Hall", 750), None, at(30), "bob").unwrap();

        assert_eq!(counts(&conn), (0, 1, 0));
        assert_eq!(second.id, first.id);
        assert_eq!(second.occupancy, 750);
        assert_eq!(second.last_updated, at(30));
        // earlier upload carried forward
        assert_eq!(second.image, "Zmlyc3Q=");
    }

    #[test]
    fn test_scenario_submit_then_approve() {
        let conn = test_conn();
        let pending = submit_addition(&conn, &submission("City Hall", 500), None, at(0), "ann").unwrap();

        let published = approve_addition(&conn, &pending.id, at(60), "root").unwrap();

        assert_eq!(published.building.id, pending.id);
        assert_eq!(published.building.name, "City Hall");
        assert_eq!(published.building.occupancy, 500);
        assert_eq!(published.building.last_updated, at(60));
        assert_eq!(counts(&conn), (1, 0, 0));

        let events = db::get_events_for_subject(&conn, &pending.id).unwrap();
        assert_eq!(events[0].kind, EventKind::AdditionApproved);
        assert_eq!(events[1].kind, EventKind::AdditionSubmitted);
    }

    #[test]
    fn test_update_by_name_inherits_id_and_keeps_image() {
        let conn = test_conn();
        let mut live = Building::new(fields("Depot", 10, BuildingType::DirtyIndustry), at(0));
        live.image = "b2xk".to_string();
        db::upsert_building(&conn, &live).unwrap();

        let pending = submit_addition(&conn, &submission("Depot", 20), None, at(10), "ann").unwrap();
        assert_eq!(pending.id, live.id);
        assert_eq!(pending.image, "b2xk");

        let published = approve_addition(&conn, &pending.id, at(20), "root").unwrap();
        assert_eq!(published.building.occupancy, 20);
        assert_eq!(published.building.image, "b2xk");
        assert_eq!(counts(&conn), (1, 0, 0));
    }

    #[test]
    fn test_rename_by_id_targets_existing_record() {
        let conn = test_conn();
        let live = Building::new(fields("Old Name", 10, BuildingType::DirtyIndustry), at(0));
        db::upsert_building(&conn, &live).unwrap();

        let mut rename = submission("New Name", 10);
        rename.id = Some(live.id.clone());
        let pending = submit_addition(&conn, &rename, None, at(5), "ann").unwrap();
        assert_eq!(pending.id, live.id);

        let published = approve_addition(&conn, &live.id, at(6), "root").unwrap();
        assert_eq!(published.building.name, "New Name");
        assert_eq!(counts(&conn), (1, 0, 0));
    }

    #[test]
    fn test_approve_missing_addition_is_not_found() {
        let conn = test_conn();
        let err = approve_addition(&conn, "2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10", at(0), "root").unwrap_err();

        assert!(matches!(err, ModerationError::NotFound(_)));
        assert_eq!(counts(&conn), (0, 0, 0));
    }

    #[test]
    fn test_remove_addition_touches_no_record() {
        let conn = test_conn();
        let pending = submit_addition(&conn, &submission("Shack", 2), None, at(0), "ann").unwrap();

        remove_addition(&conn, &pending.id, at(1), "root").unwrap();

        assert_eq!(counts(&conn), (0, 0, 0));
        assert!(matches!(
            remove_addition(&conn, &pending.id, at(2), "root"),
            Err(ModerationError::NotFound(_))
        ));
    }

    #[test]
    fn test_deletion_for_missing_record_creates_nothing() {
        let conn = test_conn();
        let err = submit_deletion(&conn, "2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10", at(0), "ann").unwrap_err();

        assert!(matches!(err, ModerationError::NotFound(_)));
        assert_eq!(counts(&conn), (0, 0, 0));
    }

    #[test]
    fn test_deletion_lifecycle() {
        let conn = test_conn();
        let live = Building::new(fields("Old Mill", 40, BuildingType::Manufacturing), at(0));
        db::upsert_building(&conn, &live).unwrap();

        submit_deletion(&conn, &live.id, at(1), "ann").unwrap();
        let again = submit_deletion(&conn, &live.id, at(9), "bob").unwrap();
        assert_eq!(again.submitted_date, at(9));
        assert_eq!(counts(&conn), (1, 0, 1));

        approve_deletion(&conn, &live.id, at(10), "root").unwrap();
        assert_eq!(counts(&conn), (0, 0, 0));
        assert!(db::find_building_by_id(&conn, &live.id).unwrap().is_none());
    }

    #[test]
    fn test_remove_deletion_keeps_record() {
        let conn = test_conn();
        let live = Building::new(fields("Old Mill", 40, BuildingType::Manufacturing), at(0));
        db::upsert_building(&conn, &live).unwrap();
        submit_deletion(&conn, &live.id, at(1), "ann").unwrap();

        remove_deletion(&conn, &live.id, at(2), "root").unwrap();

        assert_eq!(counts(&conn), (1, 0, 0));
        assert!(matches!(
            remove_deletion(&conn, &live.id, at(3), "root"),
            Err(ModerationError::NotFound(_))
        ));
    }

    #[test]
    fn test_approve_deletion_without_proposal_is_audited() {
        let conn = test_conn();
        let live = Building::new(fields("Shed", 1, BuildingType::Agriculture), at(0));
        db::upsert_building(&conn, &live).unwrap();

        let err = approve_deletion(&conn, &live.id, at(5), "root").unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));

        // record stays deleted, fault is on the audit trail
        assert_eq!(counts(&conn), (0, 0, 0));
        let events = db::get_events_for_subject(&conn, &live.id).unwrap();
        assert_eq!(events[0].kind, EventKind::OrphanedDeletion);
    }
}
