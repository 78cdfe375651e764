//! Daily supplier-return housekeeping.
//!
//! ```text
//! run_housekeeping(today)
//!   │
//!   ├── last run == today ──► skipped
//!   │
//!   └── for each expired batch with stock (plan_supplier_returns):
//!         movement.add       outbound -qty   "supplier return: batch OLD"
//!         medication.update  batch NEW, expiry today + 12 months
//!         movement.add       inbound  +qty   "restock: batch NEW"
//!       then last-run := today
//! ```
//!
//! Origins do not coordinate: every origin open at day rollover runs this
//! on its own and broadcasts its own return/restock pairs.

use chrono::{NaiveDate, Utc};

use apotheca_core::housekeeping::{is_due, plan_supplier_returns, SupplierReturn};
use apotheca_core::validation::MedicationPatch;
use apotheca_core::{new_id, Movement, MovementKind};
use apotheca_sync::{EntityUpdate, Topic};
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::store::{ChangeSource, InventoryStore, Staged};

/// Actor recorded on housekeeping movements.
pub const HOUSEKEEPING_ACTOR: &str = "system:housekeeping";

/// Outcome of one housekeeping attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub date: NaiveDate,
    /// False when it had already run on `date`.
    pub ran: bool,
    pub returns: Vec<SupplierReturn>,
}

impl HousekeepingReport {
    fn skipped(date: NaiveDate) -> Self {
        HousekeepingReport {
            date,
            ran: false,
            returns: Vec::new(),
        }
    }

    /// Units sent back to suppliers (and restocked).
    pub fn returned_units(&self) -> i64 {
        self.returns.iter().fold(0i64, |acc, r| acc.saturating_add(r.quantity))
    }
}

impl InventoryStore {
    /// Returns and restocks every expired batch, at most once per `today`.
    pub fn run_housekeeping(&mut self, today: NaiveDate) -> StoreResult<HousekeepingReport> {
        if !is_due(self.last_housekeeping(), today) {
            debug!(date = %today, "Housekeeping already ran today");
            return Ok(HousekeepingReport::skipped(today));
        }

        let plan = plan_supplier_returns(self.medications(), today);
        let now = Utc::now();
        let mut medications = self.medications().to_vec();
        let mut steps = Vec::with_capacity(plan.len());

        for planned in &plan {
            let Some(medication) = medications.iter_mut().find(|m| m.id == planned.medication_id) else {
                continue;
            };

            let returned = Movement {
                id: new_id(),
                medication_id: planned.medication_id.clone(),
                kind: MovementKind::Outbound,
                delta: -planned.quantity,
                reason: format!("supplier return: batch {}", planned.old_batch),
                actor: HOUSEKEEPING_ACTOR.to_string(),
                timestamp: now,
                synthesized: false,
            };
            let patch = MedicationPatch {
                batch: Some(planned.new_batch.clone()),
                expiry_date: Some(planned.new_expiry),
                updated_at: Some(now),
                ..Default::default()
            };
            patch.apply_to(medication);
            let restocked = Movement {
                id: new_id(),
                medication_id: planned.medication_id.clone(),
                kind: MovementKind::Inbound,
                delta: planned.quantity,
                reason: format!("restock: batch {}", planned.new_batch),
                actor: HOUSEKEEPING_ACTOR.to_string(),
                timestamp: now,
                synthesized: false,
            };

            steps.push((
                returned,
                EntityUpdate {
                    id: planned.medication_id.clone(),
                    updates: patch,
                },
                restocked,
            ));
        }

        let appended = steps
            .iter()
            .flat_map(|(returned, _, restocked)| [returned.clone(), restocked.clone()])
            .collect();
        self.commit(Staged {
            medications: (!steps.is_empty()).then_some(medications),
            appended,
            last_housekeeping: Some(today),
            ..Default::default()
        })?;

        for (returned, update, restocked) in &steps {
            self.publish(Topic::MovementAdd, returned);
            self.publish(Topic::MedicationUpdate, update);
            self.publish(Topic::MovementAdd, restocked);
            self.notify(Topic::MedicationUpdate, &update.id, ChangeSource::Local);
        }

        let report = HousekeepingReport {
            date: today,
            ran: true,
            returns: plan,
        };
        info!(
            date = %today,
            returns = report.returns.len(),
            units = report.returned_units(),
            "Housekeeping finished"
        );
        Ok(report)
    }
}
