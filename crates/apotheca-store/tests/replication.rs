//! Multi-origin scenarios over an in-process broadcast (no network).

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use apotheca_core::validation::{CategoryDraft, MedicationDraft, MovementDraft};
use apotheca_core::{AlertSettings, CoreError, Money, MovementKind, Role, UserContext};
use apotheca_db::{Database, DbConfig, InventoryData, PersistHandle, PersistOp, PersistWriter};
use apotheca_store::{
    AlertCenter, ConfigStore, Dispatcher, DispatcherConfig, DispatcherHandle, InventoryStore,
    ManualClock, StoreError, Workspace,
};
use apotheca_sync::{LocalBroadcast, RealtimeBus, Topic, Transport};
use assert_matches::assert_matches;
use tokio::sync::mpsc::UnboundedReceiver;

fn noon() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2026, 5, 4, 12, 0, 0)
        .unwrap()
}

struct Origin {
    handle: DispatcherHandle,
    bus: Arc<RealtimeBus>,
    _queue: UnboundedReceiver<PersistOp>,
}

fn origin(local: &LocalBroadcast, user: UserContext) -> Origin {
    let bus = Arc::new(RealtimeBus::in_process(local));
    let (persist, queue) = PersistHandle::detached();
    let transport: Arc<dyn Transport> = bus.clone();
    let workspace = Workspace::new(
        InventoryStore::new(InventoryData::default(), persist.clone(), transport.clone()),
        ConfigStore::new(AlertSettings::default(), persist.clone(), transport),
        AlertCenter::new(user, HashSet::new(), persist),
    );
    let (handle, _join) = Dispatcher::spawn(
        workspace,
        bus.as_ref(),
        Arc::new(ManualClock::new(noon())),
        DispatcherConfig::default(),
    );
    Origin {
        handle,
        bus,
        _queue: queue,
    }
}

fn draft(name: &str, quantity: i64) -> MedicationDraft {
    MedicationDraft {
        name: name.to_string(),
        batch: "LOT-1".to_string(),
        quantity,
        min_stock: Some(10),
        expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        supplier_id: None,
        category_id: None,
        unit_price: Money::from_cents(300),
    }
}

/// Polls the dispatcher until `check` holds or two seconds pass.
async fn eventually<F>(handle: &DispatcherHandle, check: F) -> bool
where
    F: Fn(&mut Workspace) -> bool + Clone + Send + 'static,
{
    for _ in 0..200 {
        if handle.call(check.clone()).await.unwrap() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_added_medication_reaches_peer_without_double_count() {
    let local = LocalBroadcast::default();
    let a = origin(&local, UserContext::new("ana", Role::Admin));
    let b = origin(&local, UserContext::new("bruno", Role::Pharmacist));

    let med = a.handle.add_medication(draft("Amoxicilina", 10)).await.unwrap();

    let id = med.id.clone();
    assert!(
        eventually(&b.handle, move |ws| ws.store.movements_for(&id).len() == 1).await,
        "peer never saw the initial stock movement"
    );
    let id = med.id.clone();
    let quantity = b
        .handle
        .call(move |ws| ws.store.medication(&id).map(|m| m.quantity))
        .await
        .unwrap();
    assert_eq!(quantity, Some(10));
}

#[tokio::test]
async fn test_recorded_movement_applies_on_peer() {
    let local = LocalBroadcast::default();
    let a = origin(&local, UserContext::new("ana", Role::Admin));
    let b = origin(&local, UserContext::new("bruno", Role::Admin));

    let med = a.handle.add_medication(draft("Ibuprofeno", 10)).await.unwrap();
    a.handle
        .record_movement(MovementDraft {
            kind: MovementKind::Outbound,
            medication_id: med.id.clone(),
            quantity: 3,
            reason: "counter sale".to_string(),
        })
        .await
        .unwrap();

    let id = med.id.clone();
    assert!(
        eventually(&b.handle, move |ws| {
            ws.store.medication(&id).map(|m| m.quantity) == Some(7)
        })
        .await
    );
}

#[tokio::test]
async fn test_redelivered_movement_is_applied_twice() {
    let local = LocalBroadcast::default();
    let b = origin(&local, UserContext::new("bruno", Role::Admin));
    let peer = RealtimeBus::in_process(&local);

    peer.publish(
        Topic::MedicationAdd,
        json!({
            "id": "m1", "name": "Dipirona", "batch": "D-1", "quantity": 10,
            "minStock": 2, "expiryDate": "2030-01-01", "supplierId": null,
            "categoryId": null, "unitPrice": 100, "updatedAt": "2026-05-01T00:00:00Z"
        }),
    );
    let sale = json!({
        "id": "mv1", "medicationId": "m1", "kind": "outbound", "delta": -4,
        "reason": "sale", "actor": "peer-user", "timestamp": "2026-05-02T00:00:00Z"
    });
    peer.publish(Topic::MovementAdd, sale.clone());
    peer.publish(Topic::MovementAdd, sale);

    // Movements are not deduplicated by id: both deliveries count.
    assert!(
        eventually(&b.handle, |ws| {
            ws.store.medication("m1").map(|m| m.quantity) == Some(2)
        })
        .await
    );
    let ledger = b
        .handle
        .call(|ws| ws.store.movements_for("m1").len())
        .await
        .unwrap();
    assert_eq!(ledger, 2);
}

#[tokio::test]
async fn test_redelivered_update_is_idempotent() {
    let local = LocalBroadcast::default();
    let b = origin(&local, UserContext::new("bruno", Role::Admin));
    let peer = RealtimeBus::in_process(&local);

    peer.publish(
        Topic::MedicationAdd,
        json!({
            "id": "m1", "name": "Losartana", "batch": "L-1", "quantity": 30,
            "minStock": 5, "expiryDate": "2030-01-01", "supplierId": null,
            "categoryId": null, "unitPrice": 100, "updatedAt": "2026-05-01T00:00:00Z"
        }),
    );
    let update = json!({
        "id": "m1",
        "updates": { "batch": "L-2", "unitPrice": 150, "updatedAt": "2026-05-03T00:00:00Z" }
    });
    peer.publish(Topic::MedicationUpdate, update.clone());
    assert!(
        eventually(&b.handle, |ws| {
            ws.store.medication("m1").map(|m| m.batch.clone()) == Some("L-2".to_string())
        })
        .await
    );
    let once = b
        .handle
        .call(|ws| (ws.store.medication("m1").cloned(), ws.store.revision()))
        .await
        .unwrap();

    peer.publish(Topic::MedicationUpdate, update);
    peer.publish(Topic::MedicationDelete, json!({ "id": "unknown" }));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let twice = b
        .handle
        .call(|ws| (ws.store.medication("m1").cloned(), ws.store.revision()))
        .await
        .unwrap();
    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_acknowledgment_hides_alert_for_one_user_only() {
    let local = LocalBroadcast::default();
    let a = origin(&local, UserContext::new("ana", Role::Admin));
    let b = origin(&local, UserContext::new("bruno", Role::Admin));

    let med = a.handle.add_medication(draft("Captopril", 3)).await.unwrap();
    let alert_id = format!("{}-low-stock", med.id);

    let id = alert_id.clone();
    assert!(eventually(&b.handle, move |ws| ws.alerts.view().is_visible(&id)).await);

    assert!(a.handle.acknowledge(&alert_id).await.unwrap());
    assert!(!a.handle.current_alerts().is_visible(&alert_id));
    assert!(b.handle.current_alerts().is_visible(&alert_id));
}

#[tokio::test]
async fn test_config_update_replicates_and_reshapes_alerts() {
    let local = LocalBroadcast::default();
    let admin = origin(&local, UserContext::new("ana", Role::Admin));
    let pharmacist = origin(&local, UserContext::new("bruno", Role::Pharmacist));

    let med = admin.handle.add_medication(draft("Atenolol", 3)).await.unwrap();
    let alert_id = format!("{}-low-stock", med.id);
    let id = alert_id.clone();
    assert!(eventually(&pharmacist.handle, move |ws| ws.alerts.view().is_visible(&id)).await);

    let denied = pharmacist
        .handle
        .update_settings("rules", json!({ "stock": false }))
        .await;
    assert_matches!(denied, Err(StoreError::Core(CoreError::PermissionDenied { .. })));

    admin
        .handle
        .update_settings("rules", json!({ "stock": false }))
        .await
        .unwrap();

    let id = alert_id.clone();
    assert!(
        eventually(&pharmacist.handle, move |ws| {
            !ws.settings.settings().rules.stock && !ws.alerts.view().is_visible(&id)
        })
        .await
    );
}

#[tokio::test]
async fn test_category_delete_blocked_while_referenced() {
    let local = LocalBroadcast::default();
    let a = origin(&local, UserContext::new("ana", Role::Admin));

    let category = a
        .handle
        .try_call(|ws| {
            ws.store.add_category(CategoryDraft {
                name: "Cardiológicos".to_string(),
                description: None,
            })
        })
        .await
        .unwrap();

    let mut referencing = draft("Digoxina", 5);
    referencing.category_id = Some(category.id.clone());
    let med = a.handle.add_medication(referencing).await.unwrap();

    let id = category.id.clone();
    let blocked = a.handle.try_call(move |ws| ws.store.delete_category(&id)).await;
    assert_matches!(
        blocked,
        Err(StoreError::Core(CoreError::ReferentialIntegrity { references: 1, .. }))
    );

    let med_id = med.id.clone();
    a.handle
        .try_call(move |ws| ws.store.delete_medication(&med_id))
        .await
        .unwrap();
    let id = category.id.clone();
    assert!(a.handle.try_call(move |ws| ws.store.delete_category(&id)).await.is_ok());
}

#[tokio::test]
async fn test_state_and_acknowledgments_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apotheca.db");
    let user = UserContext::new("ana", Role::Admin);
    let local = LocalBroadcast::default();

    let alert_id = {
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let (persist, writer) = PersistWriter::spawn(db.kv());
        let bus = Arc::new(RealtimeBus::in_process(&local));
        let workspace = Workspace::load(&db.state(), persist.clone(), bus.clone(), user.clone()).await;
        let (handle, join) = Dispatcher::spawn(
            workspace,
            bus.as_ref(),
            Arc::new(ManualClock::new(noon())),
            DispatcherConfig::default(),
        );

        let med = handle.add_medication(draft("Metformina", 4)).await.unwrap();
        let alert_id = format!("{}-low-stock", med.id);
        handle.acknowledge(&alert_id).await.unwrap();

        handle.shutdown().await;
        drop(join.await.unwrap());
        persist.flush().await.unwrap();
        drop(persist);
        drop(handle);
        writer.await.unwrap();
        alert_id
    };

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let (persist, _writer) = PersistWriter::spawn(db.kv());
    let bus = Arc::new(RealtimeBus::in_process(&local));
    let mut workspace = Workspace::load(&db.state(), persist, bus, user).await;

    assert_eq!(workspace.store.medications().len(), 1);
    assert_eq!(workspace.store.movements().len(), 1);
    assert!(workspace.alerts.is_acknowledged(&alert_id));
    assert!(!workspace.recompute_alerts(noon()).is_visible(&alert_id));
}
