//! # Alert Center
//!
//! Per-user alert state of one origin: who is signed in, which alerts they
//! dismissed, and the last evaluated view.
//!
//! ```text
//! recompute(store, settings, now) ──► alerts::evaluate ──► view
//! acknowledge / unacknowledge   ──► ack set ──► persist ──► alerts::filter_view
//! switch_user                   ──► new ack set, stale view until recompute
//! ```
//!
//! Acknowledgments are never replicated; each user's set lives under its
//! own persistence key.

use chrono::{DateTime, FixedOffset};
use std::collections::HashSet;
use tracing::{debug, info};

use apotheca_core::alerts::{self, AlertInputs};
use apotheca_core::{AlertSettings, AlertView, UserContext};
use apotheca_db::{keys, PersistHandle};

use crate::error::StoreResult;
use crate::store::InventoryStore;

pub struct AlertCenter {
    user: UserContext,
    acknowledged: HashSet<String>,
    view: AlertView,
    /// Bumped whenever the view changes without a store or settings change.
    generation: u64,
    persist: PersistHandle,
}

impl AlertCenter {
    pub fn new(user: UserContext, acknowledged: HashSet<String>, persist: PersistHandle) -> Self {
        AlertCenter {
            user,
            acknowledged,
            view: AlertView::default(),
            generation: 0,
            persist,
        }
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    /// The last computed view.
    pub fn view(&self) -> &AlertView {
        &self.view
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_acknowledged(&self, alert_id: &str) -> bool {
        self.acknowledged.contains(alert_id)
    }

    pub fn acknowledged(&self) -> &HashSet<String> {
        &self.acknowledged
    }

    /// Re-derives every alert from current state.
    pub fn recompute(
        &mut self,
        store: &InventoryStore,
        settings: &AlertSettings,
        now: DateTime<FixedOffset>,
    ) -> &AlertView {
        self.view = alerts::evaluate(&AlertInputs {
            medications: store.medications(),
            movements: store.movements(),
            settings,
            now,
            role: self.user.role,
            acknowledged: &self.acknowledged,
        });
        debug!(
            user = %self.user.user_id,
            visible = self.view.visible.len(),
            suppressed = self.view.suppressed,
            "Alerts recomputed"
        );
        &self.view
    }

    /// Hides `alert_id` for the current user. Returns false if it already was.
    pub fn acknowledge(&mut self, alert_id: &str) -> StoreResult<bool> {
        if self.acknowledged.contains(alert_id) {
            return Ok(false);
        }
        let mut next = self.acknowledged.clone();
        next.insert(alert_id.to_string());
        self.replace_acknowledged(next)?;
        Ok(true)
    }

    /// Shows `alert_id` again. Returns false if it was not acknowledged.
    pub fn unacknowledge(&mut self, alert_id: &str) -> StoreResult<bool> {
        if !self.acknowledged.contains(alert_id) {
            return Ok(false);
        }
        let mut next = self.acknowledged.clone();
        next.remove(alert_id);
        self.replace_acknowledged(next)?;
        Ok(true)
    }

    /// Acknowledges every role-visible alert of the last view, including
    /// ones hidden by quiet hours. Returns how many were newly acknowledged.
    pub fn acknowledge_all(&mut self) -> StoreResult<usize> {
        let mut next = self.acknowledged.clone();
        let added = self
            .view
            .role_visible
            .iter()
            .filter(|alert| next.insert(alert.id.clone()))
            .count();
        if added > 0 {
            self.replace_acknowledged(next)?;
        }
        Ok(added)
    }

    /// Signs another user in. The view stays stale until the next recompute.
    pub fn switch_user(&mut self, user: UserContext, acknowledged: HashSet<String>) {
        info!(from = %self.user.user_id, to = %user.user_id, role = %user.role, "Switching user");
        self.user = user;
        self.acknowledged = acknowledged;
        self.view = AlertView::default();
        self.generation += 1;
    }

    fn replace_acknowledged(&mut self, next: HashSet<String>) -> StoreResult<()> {
        let mut ids: Vec<&String> = next.iter().collect();
        ids.sort();
        self.persist.put(&keys::acknowledgments(&self.user.user_id), &ids)?;

        self.acknowledged = next;
        let role_visible = std::mem::take(&mut self.view.role_visible);
        self.view = alerts::filter_view(role_visible, self.view.quiet_hours_active, &self.acknowledged);
        self.generation += 1;
        Ok(())
    }
}
