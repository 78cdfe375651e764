//! # Inventory Store
//!
//! The single owner of the replicated collections of one origin.
//!
//! ## Local Mutation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  add/update/delete_*, record_movement                                   │
//! │    │                                                                    │
//! │    ├── 1. validate          (Validate trait, typed drafts/patches)      │
//! │    ├── 2. business rules    (Duplicate, NotFound, InsufficientStock,    │
//! │    │                         ReferentialIntegrity)                      │
//! │    ├── 3. stage next state  (nothing visible yet)                       │
//! │    ├── 4. persist           (encode every key, then enqueue)            │
//! │    ├── 5. commit            (swap collections, revision += 1)           │
//! │    ├── 6. publish           (Transport, fire-and-forget)                │
//! │    └── 7. notify            (StoreChange on the changes() channel)      │
//! │                                                                         │
//! │  A failure in 1..4 returns the error with nothing applied.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Remote Merge
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_remote(envelope)        no validation, no re-publication         │
//! │                                                                         │
//! │  medication.add     upsert by id                                        │
//! │  medication.update  overwrite present fields   (idempotent)             │
//! │  medication.delete  remove if present                                   │
//! │  movement.add       append to ledger; apply delta unless synthesized    │
//! │                     (NOT deduplicated, quantity clamped at 0)           │
//! │  category.* / supplier.*   same as medication                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent updates of one medication from two origins resolve as
//! last-applied-wins. There is no causal metadata to do better.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use apotheca_core::normalize::same_name;
use apotheca_core::validation::{
    CategoryDraft, CategoryPatch, MedicationDraft, MedicationPatch, MovementDraft, SupplierDraft,
    SupplierPatch,
};
use apotheca_core::{
    new_id, Category, CoreError, Medication, Money, Movement, MovementKind, ReferenceKind,
    Supplier, Validate, ValidationError, MAX_QUANTITY,
};
use apotheca_db::{keys, DbResult, InventoryData, PersistHandle, PersistOp};
use apotheca_sync::{EntityRef, EntityUpdate, Envelope, Topic, Transport};

use crate::error::StoreResult;

/// Reason recorded on the movement synthesized for a new medication's stock.
pub const INITIAL_STOCK_REASON: &str = "initial stock";

/// Reason recorded on the adjustment synthesized for a quantity edit.
pub const QUANTITY_EDIT_REASON: &str = "quantity edit";

const CHANGE_CAPACITY: usize = 256;

// =============================================================================
// Change Notifications
// =============================================================================

/// Where a committed change came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSource {
    Local,
    Remote { origin_id: String },
}

/// One committed change, delivered to every `changes()` receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Store revision right after the change.
    pub revision: u64,
    /// The topic that describes the change (the first one, for multi-topic
    /// mutations).
    pub topic: Topic,
    pub entity_id: String,
    pub source: ChangeSource,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable copy of the collections for readers such as exports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySnapshot {
    pub revision: u64,
    pub taken_at: DateTime<Utc>,
    pub medications: Vec<Medication>,
    pub movements: Vec<Movement>,
    pub categories: Vec<Category>,
    pub suppliers: Vec<Supplier>,
    /// Sum of units on hand.
    pub total_units: i64,
    /// Sum of `quantity * unit_price`.
    pub total_value: Money,
}

impl InventorySnapshot {
    /// The collections in their persisted shape.
    pub fn into_data(self) -> InventoryData {
        InventoryData {
            medications: self.medications,
            movements: self.movements,
            categories: self.categories,
            suppliers: self.suppliers,
        }
    }
}

// =============================================================================
// Staging
// =============================================================================

/// The next state of whatever a mutation touches.
#[derive(Debug, Default)]
pub(crate) struct Staged {
    pub(crate) medications: Option<Vec<Medication>>,
    pub(crate) appended: Vec<Movement>,
    pub(crate) categories: Option<Vec<Category>>,
    pub(crate) suppliers: Option<Vec<Supplier>>,
    pub(crate) last_housekeeping: Option<NaiveDate>,
}

/// Serializes the current ledger followed by staged entries without
/// copying either.
struct Ledger<'a>(&'a [Movement], &'a [Movement]);

impl Serialize for Ledger<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().chain(self.1.iter()))
    }
}

trait Named {
    const ENTITY: &'static str;
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

impl Named for Medication {
    const ENTITY: &'static str = "medication";
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Category {
    const ENTITY: &'static str = "category";
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Supplier {
    const ENTITY: &'static str = "supplier";
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

fn position<E: Named>(items: &[E], id: &str) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}

fn find_index<E: Named>(items: &[E], id: &str) -> Result<usize, CoreError> {
    position(items, id).ok_or_else(|| CoreError::NotFound {
        entity: E::ENTITY,
        id: id.to_string(),
    })
}

/// Rejects `name` if another entity (other than `except`) normalizes to it.
fn ensure_unique<E: Named>(items: &[E], name: &str, except: Option<&str>) -> Result<(), CoreError> {
    let taken = items
        .iter()
        .any(|item| Some(item.id()) != except && same_name(item.name(), name));
    if taken {
        return Err(CoreError::Duplicate {
            entity: E::ENTITY,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn upserted<E: Named + Clone>(items: &[E], item: E) -> Vec<E> {
    let mut next = items.to_vec();
    match position(&next, item.id()) {
        Some(index) => next[index] = item,
        None => next.push(item),
    }
    next
}

fn without<E: Named + Clone>(items: &[E], id: &str) -> Option<Vec<E>> {
    let index = position(items, id)?;
    let mut next = items.to_vec();
    next.remove(index);
    Some(next)
}

fn decode<T: DeserializeOwned>(topic: Topic, payload: &Value) -> Option<T> {
    match serde_json::from_value(payload.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(topic = %topic, error = %e, "Undecodable payload, merge skipped");
            None
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Replicated inventory state of one origin.
///
/// Not `Sync`-shared: the dispatcher owns it and runs every mutation and
/// merge one at a time.
pub struct InventoryStore {
    medications: Vec<Medication>,
    movements: Vec<Movement>,
    categories: Vec<Category>,
    suppliers: Vec<Supplier>,
    last_housekeeping: Option<NaiveDate>,
    revision: u64,
    persist: PersistHandle,
    transport: Arc<dyn Transport>,
    changes_tx: broadcast::Sender<StoreChange>,
}

impl InventoryStore {
    /// Builds a store over previously loaded collections.
    pub fn new(data: InventoryData, persist: PersistHandle, transport: Arc<dyn Transport>) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CAPACITY);
        InventoryStore {
            medications: data.medications,
            movements: data.movements,
            categories: data.categories,
            suppliers: data.suppliers,
            last_housekeeping: None,
            revision: 0,
            persist,
            transport,
            changes_tx,
        }
    }

    /// Sets the persisted date of the last housekeeping run.
    pub fn with_last_housekeeping(mut self, date: Option<NaiveDate>) -> Self {
        self.last_housekeeping = date;
        self
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Increments once per committed mutation or merge.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Observer of committed changes.
    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes_tx.subscribe()
    }

    pub fn origin_id(&self) -> &str {
        self.transport.origin_id()
    }

    pub fn medications(&self) -> &[Medication] {
        &self.medications
    }

    pub fn medication(&self, id: &str) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    /// Looks a medication up by name, ignoring case and diacritics.
    pub fn medication_by_name(&self, name: &str) -> Option<&Medication> {
        self.medications.iter().find(|m| same_name(&m.name, name))
    }

    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    /// Ledger entries of one medication, oldest first.
    pub fn movements_for(&self, medication_id: &str) -> Vec<&Movement> {
        self.movements
            .iter()
            .filter(|m| m.medication_id == medication_id)
            .collect()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn suppliers(&self) -> &[Supplier] {
        &self.suppliers
    }

    pub fn supplier(&self, id: &str) -> Option<&Supplier> {
        self.suppliers.iter().find(|s| s.id == id)
    }

    pub fn last_housekeeping(&self) -> Option<NaiveDate> {
        self.last_housekeeping
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        let total_units = self
            .medications
            .iter()
            .fold(0i64, |acc, m| acc.saturating_add(m.quantity));
        let total_value = self
            .medications
            .iter()
            .fold(Money::zero(), |acc, m| acc + m.stock_value());

        InventorySnapshot {
            revision: self.revision,
            taken_at: Utc::now(),
            medications: self.medications.clone(),
            movements: self.movements.clone(),
            categories: self.categories.clone(),
            suppliers: self.suppliers.clone(),
            total_units,
            total_value,
        }
    }

    // -------------------------------------------------------------------------
    // Medications
    // -------------------------------------------------------------------------

    /// Creates a medication. A positive initial quantity is also recorded
    /// as an inbound movement.
    pub fn add_medication(&mut self, draft: MedicationDraft, actor: &str) -> StoreResult<Medication> {
        let draft = draft.validate()?;
        ensure_unique(&self.medications, &draft.name, None)?;
        self.check_references(draft.category_id.as_deref(), draft.supplier_id.as_deref())?;

        let now = Utc::now();
        let medication = draft.into_medication(new_id(), now);
        let initial = (medication.quantity > 0).then(|| Movement {
            id: new_id(),
            medication_id: medication.id.clone(),
            kind: MovementKind::Inbound,
            delta: medication.quantity,
            reason: INITIAL_STOCK_REASON.to_string(),
            actor: actor.to_string(),
            timestamp: now,
            synthesized: true,
        });

        let mut medications = self.medications.clone();
        medications.push(medication.clone());
        self.commit(Staged {
            medications: Some(medications),
            appended: initial.iter().cloned().collect(),
            ..Default::default()
        })?;

        info!(
            medication_id = %medication.id,
            name = %medication.name,
            quantity = medication.quantity,
            "Medication added"
        );
        self.publish(Topic::MedicationAdd, &medication);
        if let Some(movement) = &initial {
            self.publish(Topic::MovementAdd, movement);
        }
        self.notify(Topic::MedicationAdd, &medication.id, ChangeSource::Local);
        Ok(medication)
    }

    /// Overwrites the fields present in `patch`. A quantity change is
    /// recorded as an adjustment movement.
    pub fn update_medication(
        &mut self,
        id: &str,
        patch: MedicationPatch,
        actor: &str,
    ) -> StoreResult<Medication> {
        let mut patch = patch.validate()?;
        let index = find_index(&self.medications, id)?;
        if let Some(name) = &patch.name {
            ensure_unique(&self.medications, name, Some(id))?;
        }
        self.check_references(patch.category_id.as_deref(), patch.supplier_id.as_deref())?;

        let now = Utc::now();
        patch.updated_at = Some(now);
        let mut updated = self.medications[index].clone();
        patch.apply_to(&mut updated);

        let delta = updated.quantity.saturating_sub(self.medications[index].quantity);
        let adjustment = (delta != 0).then(|| Movement {
            id: new_id(),
            medication_id: updated.id.clone(),
            kind: MovementKind::Adjustment,
            delta,
            reason: QUANTITY_EDIT_REASON.to_string(),
            actor: actor.to_string(),
            timestamp: now,
            synthesized: true,
        });

        let mut medications = self.medications.clone();
        medications[index] = updated.clone();
        self.commit(Staged {
            medications: Some(medications),
            appended: adjustment.iter().cloned().collect(),
            ..Default::default()
        })?;

        debug!(medication_id = %id, delta, "Medication updated");
        self.publish(
            Topic::MedicationUpdate,
            &EntityUpdate {
                id: id.to_string(),
                updates: patch,
            },
        );
        if let Some(movement) = &adjustment {
            self.publish(Topic::MovementAdd, movement);
        }
        self.notify(Topic::MedicationUpdate, id, ChangeSource::Local);
        Ok(updated)
    }

    /// Removes a medication. Its movements stay in the ledger.
    pub fn delete_medication(&mut self, id: &str) -> StoreResult<Medication> {
        let index = find_index(&self.medications, id)?;
        let mut medications = self.medications.clone();
        let removed = medications.remove(index);

        self.commit(Staged {
            medications: Some(medications),
            ..Default::default()
        })?;

        info!(medication_id = %id, name = %removed.name, "Medication deleted");
        self.publish(Topic::MedicationDelete, &EntityRef { id: id.to_string() });
        self.notify(Topic::MedicationDelete, id, ChangeSource::Local);
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Movements
    // -------------------------------------------------------------------------

    /// Appends a movement and applies its delta.
    ///
    /// Rejected with `InsufficientStock` when the result would be negative
    /// and with `OutOfRange` when an increase would pass `MAX_QUANTITY`.
    pub fn record_movement(&mut self, draft: MovementDraft, actor: &str) -> StoreResult<Movement> {
        let draft = draft.validate()?;
        let index = find_index(&self.medications, &draft.medication_id)?;
        let delta = draft.delta();

        let current = &self.medications[index];
        let quantity = current.quantity.saturating_add(delta);
        if quantity < 0 {
            return Err(CoreError::InsufficientStock {
                medication: current.name.clone(),
                available: current.quantity,
                requested: delta.saturating_neg(),
            }
            .into());
        }
        if delta > 0 && quantity > MAX_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 0,
                max: MAX_QUANTITY,
            }
            .into());
        }

        let now = Utc::now();
        let movement = Movement {
            id: new_id(),
            medication_id: current.id.clone(),
            kind: draft.kind,
            delta,
            reason: draft.reason,
            actor: actor.to_string(),
            timestamp: now,
            synthesized: false,
        };

        let mut medications = self.medications.clone();
        medications[index].quantity = quantity;
        medications[index].updated_at = now;
        self.commit(Staged {
            medications: Some(medications),
            appended: vec![movement.clone()],
            ..Default::default()
        })?;

        info!(
            medication_id = %movement.medication_id,
            kind = %movement.kind,
            delta,
            quantity,
            "Movement recorded"
        );
        self.publish(Topic::MovementAdd, &movement);
        self.notify(Topic::MovementAdd, &movement.medication_id, ChangeSource::Local);
        Ok(movement)
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    pub fn add_category(&mut self, draft: CategoryDraft) -> StoreResult<Category> {
        let draft = draft.validate()?;
        ensure_unique(&self.categories, &draft.name, None)?;

        let category = draft.into_category(new_id(), Utc::now());
        let mut categories = self.categories.clone();
        categories.push(category.clone());
        self.commit(Staged {
            categories: Some(categories),
            ..Default::default()
        })?;

        debug!(category_id = %category.id, name = %category.name, "Category added");
        self.publish(Topic::CategoryAdd, &category);
        self.notify(Topic::CategoryAdd, &category.id, ChangeSource::Local);
        Ok(category)
    }

    pub fn update_category(&mut self, id: &str, patch: CategoryPatch) -> StoreResult<Category> {
        let mut patch = patch.validate()?;
        let index = find_index(&self.categories, id)?;
        if let Some(name) = &patch.name {
            ensure_unique(&self.categories, name, Some(id))?;
        }

        patch.updated_at = Some(Utc::now());
        let mut categories = self.categories.clone();
        patch.apply_to(&mut categories[index]);
        let updated = categories[index].clone();
        self.commit(Staged {
            categories: Some(categories),
            ..Default::default()
        })?;

        self.publish(
            Topic::CategoryUpdate,
            &EntityUpdate {
                id: id.to_string(),
                updates: patch,
            },
        );
        self.notify(Topic::CategoryUpdate, id, ChangeSource::Local);
        Ok(updated)
    }

    /// Rejected while any medication still references the category.
    pub fn delete_category(&mut self, id: &str) -> StoreResult<Category> {
        let index = find_index(&self.categories, id)?;
        self.ensure_unreferenced::<Category>(ReferenceKind::Category, id)?;

        let mut categories = self.categories.clone();
        let removed = categories.remove(index);
        self.commit(Staged {
            categories: Some(categories),
            ..Default::default()
        })?;

        debug!(category_id = %id, "Category deleted");
        self.publish(Topic::CategoryDelete, &EntityRef { id: id.to_string() });
        self.notify(Topic::CategoryDelete, id, ChangeSource::Local);
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Suppliers
    // -------------------------------------------------------------------------

    pub fn add_supplier(&mut self, draft: SupplierDraft) -> StoreResult<Supplier> {
        let draft = draft.validate()?;
        ensure_unique(&self.suppliers, &draft.name, None)?;

        let supplier = draft.into_supplier(new_id(), Utc::now());
        let mut suppliers = self.suppliers.clone();
        suppliers.push(supplier.clone());
        self.commit(Staged {
            suppliers: Some(suppliers),
            ..Default::default()
        })?;

        debug!(supplier_id = %supplier.id, name = %supplier.name, "Supplier added");
        self.publish(Topic::SupplierAdd, &supplier);
        self.notify(Topic::SupplierAdd, &supplier.id, ChangeSource::Local);
        Ok(supplier)
    }

    pub fn update_supplier(&mut self, id: &str, patch: SupplierPatch) -> StoreResult<Supplier> {
        let mut patch = patch.validate()?;
        let index = find_index(&self.suppliers, id)?;
        if let Some(name) = &patch.name {
            ensure_unique(&self.suppliers, name, Some(id))?;
        }

        patch.updated_at = Some(Utc::now());
        let mut suppliers = self.suppliers.clone();
        patch.apply_to(&mut suppliers[index]);
        let updated = suppliers[index].clone();
        self.commit(Staged {
            suppliers: Some(suppliers),
            ..Default::default()
        })?;

        self.publish(
            Topic::SupplierUpdate,
            &EntityUpdate {
                id: id.to_string(),
                updates: patch,
            },
        );
        self.notify(Topic::SupplierUpdate, id, ChangeSource::Local);
        Ok(updated)
    }

    /// Rejected while any medication still references the supplier.
    pub fn delete_supplier(&mut self, id: &str) -> StoreResult<Supplier> {
        let index = find_index(&self.suppliers, id)?;
        self.ensure_unreferenced::<Supplier>(ReferenceKind::Supplier, id)?;

        let mut suppliers = self.suppliers.clone();
        let removed = suppliers.remove(index);
        self.commit(Staged {
            suppliers: Some(suppliers),
            ..Default::default()
        })?;

        debug!(supplier_id = %id, "Supplier deleted");
        self.publish(Topic::SupplierDelete, &EntityRef { id: id.to_string() });
        self.notify(Topic::SupplierDelete, id, ChangeSource::Local);
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Remote Merge
    // -------------------------------------------------------------------------

    /// Merges an envelope from another origin. Returns whether state changed.
    ///
    /// Own envelopes, `config.update` and undecodable payloads are ignored.
    pub fn apply_remote(&mut self, envelope: &Envelope) -> bool {
        if envelope.is_from(self.transport.origin_id()) {
            trace!(topic = %envelope.topic, "Own envelope, not merged");
            return false;
        }

        let topic = match envelope.topic() {
            Ok(topic) => topic,
            Err(e) => {
                debug!(topic = %envelope.topic, error = %e, "Envelope not merged");
                return false;
            }
        };

        let Some((staged, entity_id)) = self.stage_remote(topic, &envelope.payload) else {
            return false;
        };

        if let Err(e) = self.commit(staged) {
            warn!(topic = %topic, origin = %envelope.origin_id, error = %e, "Merge not persisted, dropped");
            return false;
        }

        debug!(topic = %topic, origin = %envelope.origin_id, entity_id = %entity_id, "Merged remote change");
        self.notify(
            topic,
            &entity_id,
            ChangeSource::Remote {
                origin_id: envelope.origin_id.clone(),
            },
        );
        true
    }

    fn stage_remote(&self, topic: Topic, payload: &Value) -> Option<(Staged, String)> {
        match topic {
            Topic::MedicationAdd => {
                let medication: Medication = decode(topic, payload)?;
                let id = medication.id.clone();
                let staged = Staged {
                    medications: Some(upserted(&self.medications, medication)),
                    ..Default::default()
                };
                Some((staged, id))
            }
            Topic::MedicationUpdate => {
                let update: EntityUpdate<MedicationPatch> = decode(topic, payload)?;
                let Some(index) = position(&self.medications, &update.id) else {
                    debug!(medication_id = %update.id, "Update for unknown medication ignored");
                    return None;
                };
                let mut medications = self.medications.clone();
                update.updates.apply_to(&mut medications[index]);
                if medications[index] == self.medications[index] {
                    return None;
                }
                let staged = Staged {
                    medications: Some(medications),
                    ..Default::default()
                };
                Some((staged, update.id))
            }
            Topic::MedicationDelete => {
                let target: EntityRef = decode(topic, payload)?;
                let medications = without(&self.medications, &target.id)?;
                let staged = Staged {
                    medications: Some(medications),
                    ..Default::default()
                };
                Some((staged, target.id))
            }
            Topic::MovementAdd => {
                let movement: Movement = decode(topic, payload)?;
                Some(self.stage_remote_movement(movement))
            }
            Topic::CategoryAdd => {
                let category: Category = decode(topic, payload)?;
                let id = category.id.clone();
                let staged = Staged {
                    categories: Some(upserted(&self.categories, category)),
                    ..Default::default()
                };
                Some((staged, id))
            }
            Topic::CategoryUpdate => {
                let update: EntityUpdate<CategoryPatch> = decode(topic, payload)?;
                let index = position(&self.categories, &update.id)?;
                let mut categories = self.categories.clone();
                update.updates.apply_to(&mut categories[index]);
                if categories[index] == self.categories[index] {
                    return None;
                }
                let staged = Staged {
                    categories: Some(categories),
                    ..Default::default()
                };
                Some((staged, update.id))
            }
            Topic::CategoryDelete => {
                let target: EntityRef = decode(topic, payload)?;
                let staged = Staged {
                    categories: Some(without(&self.categories, &target.id)?),
                    ..Default::default()
                };
                Some((staged, target.id))
            }
            Topic::SupplierAdd => {
                let supplier: Supplier = decode(topic, payload)?;
                let id = supplier.id.clone();
                let staged = Staged {
                    suppliers: Some(upserted(&self.suppliers, supplier)),
                    ..Default::default()
                };
                Some((staged, id))
            }
            Topic::SupplierUpdate => {
                let update: EntityUpdate<SupplierPatch> = decode(topic, payload)?;
                let index = position(&self.suppliers, &update.id)?;
                let mut suppliers = self.suppliers.clone();
                update.updates.apply_to(&mut suppliers[index]);
                if suppliers[index] == self.suppliers[index] {
                    return None;
                }
                let staged = Staged {
                    suppliers: Some(suppliers),
                    ..Default::default()
                };
                Some((staged, update.id))
            }
            Topic::SupplierDelete => {
                let target: EntityRef = decode(topic, payload)?;
                let staged = Staged {
                    suppliers: Some(without(&self.suppliers, &target.id)?),
                    ..Default::default()
                };
                Some((staged, target.id))
            }
            Topic::ConfigUpdate => None,
        }
    }

    /// Remote movements are appended even when already present: a
    /// redelivered `movement.add` applies its delta again.
    fn stage_remote_movement(&self, movement: Movement) -> (Staged, String) {
        let medication_id = movement.medication_id.clone();
        let mut staged = Staged::default();

        if movement.synthesized {
            trace!(medication_id = %medication_id, "Synthesized movement, ledger only");
        } else if let Some(index) = position(&self.medications, &medication_id) {
            let mut medications = self.medications.clone();
            let target = &mut medications[index];
            let quantity = target.quantity.saturating_add(movement.delta);
            if quantity < 0 {
                warn!(
                    medication_id = %medication_id,
                    quantity = target.quantity,
                    delta = movement.delta,
                    "Remote movement would go negative, clamped at 0"
                );
            }
            target.quantity = quantity.max(0);
            staged.medications = Some(medications);
        } else {
            debug!(medication_id = %medication_id, "Movement for unknown medication kept in ledger");
        }

        staged.appended.push(movement);
        (staged, medication_id)
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    fn check_references(&self, category_id: Option<&str>, supplier_id: Option<&str>) -> Result<(), CoreError> {
        let mut errors = Vec::new();
        if let Some(id) = category_id {
            if self.category(id).is_none() {
                errors.push(ValidationError::UnknownReference {
                    field: "categoryId".to_string(),
                    id: id.to_string(),
                });
            }
        }
        if let Some(id) = supplier_id {
            if self.supplier(id).is_none() {
                errors.push(ValidationError::UnknownReference {
                    field: "supplierId".to_string(),
                    id: id.to_string(),
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(errors))
        }
    }

    fn ensure_unreferenced<E: Named>(&self, kind: ReferenceKind, id: &str) -> Result<(), CoreError> {
        let references = self
            .medications
            .iter()
            .filter(|m| m.references(kind, id))
            .count();
        if references > 0 {
            return Err(CoreError::ReferentialIntegrity {
                entity: E::ENTITY,
                id: id.to_string(),
                references,
            });
        }
        Ok(())
    }

    fn encode(&self, staged: &Staged) -> DbResult<Vec<PersistOp>> {
        let mut ops = Vec::new();
        if let Some(medications) = &staged.medications {
            ops.push(PersistOp::put(keys::MEDICATIONS, medications)?);
        }
        if !staged.appended.is_empty() {
            ops.push(PersistOp::put(
                keys::MOVEMENTS,
                &Ledger(&self.movements, &staged.appended),
            )?);
        }
        if let Some(categories) = &staged.categories {
            ops.push(PersistOp::put(keys::CATEGORIES, categories)?);
        }
        if let Some(suppliers) = &staged.suppliers {
            ops.push(PersistOp::put(keys::SUPPLIERS, suppliers)?);
        }
        if let Some(date) = &staged.last_housekeeping {
            ops.push(PersistOp::put(keys::LAST_HOUSEKEEPING, date)?);
        }
        Ok(ops)
    }

    /// Persists then swaps in the staged state. Nothing changes on error.
    pub(crate) fn commit(&mut self, staged: Staged) -> StoreResult<()> {
        let ops = self.encode(&staged)?;
        self.persist.submit(ops)?;

        if let Some(medications) = staged.medications {
            self.medications = medications;
        }
        self.movements.extend(staged.appended);
        if let Some(categories) = staged.categories {
            self.categories = categories;
        }
        if let Some(suppliers) = staged.suppliers {
            self.suppliers = suppliers;
        }
        if staged.last_housekeeping.is_some() {
            self.last_housekeeping = staged.last_housekeeping;
        }
        self.revision += 1;
        Ok(())
    }

    pub(crate) fn publish<T: Serialize>(&self, topic: Topic, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.transport.publish(topic, value),
            Err(e) => warn!(topic = %topic, error = %e, "Payload not serializable, not published"),
        }
    }

    pub(crate) fn notify(&self, topic: Topic, entity_id: &str, source: ChangeSource) {
        // No receivers is fine.
        let _ = self.changes_tx.send(StoreChange {
            revision: self.revision,
            topic,
            entity_id: entity_id.to_string(),
            source,
        });
    }
}
