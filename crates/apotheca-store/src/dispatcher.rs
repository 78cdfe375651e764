//! # Dispatcher
//!
//! One task owns the [`Workspace`]; everything that touches it is a message.
//!
//! ## Event Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Dispatcher task                               │
//! │                                                                         │
//! │  Transport handlers ──► remote mpsc ──┐                                 │
//! │  (one per topic)                      │                                 │
//! │                                       │                                 │
//! │  DispatcherHandle::call ──► command ──┼──► select! ──► Workspace        │
//! │  (closure + oneshot reply)   mpsc     │       │                         │
//! │                                       │       ▼                         │
//! │  interval (60 s) ─────────────────────┤   housekeeping (on tick)        │
//! │                                       │       │                         │
//! │  shutdown ────────────────────────────┘       ▼                         │
//! │                                          recompute alerts if store,     │
//! │                                          settings or acks changed       │
//! │                                          (always on tick)               │
//! │                                               │                         │
//! │                                               ▼                         │
//! │                                     watch<AlertView> ──► UI / logger    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inputs are handled strictly one at a time, so no part of the workspace
//! needs a lock. Shutdown drops every transport subscription and hands the
//! workspace back through the task's `JoinHandle`.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use apotheca_core::validation::{MedicationDraft, MovementDraft};
use apotheca_core::{AlertSettings, AlertView, Medication, Movement};
use apotheca_sync::{Envelope, Handler, Subscription, Topic, Transport};

use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use crate::store::InventorySnapshot;
use crate::workspace::Workspace;

/// Runs against the workspace and returns the reply to send once the alert
/// view has been refreshed.
type Command = Box<dyn FnOnce(&mut Workspace) -> Reply + Send>;
type Reply = Box<dyn FnOnce() + Send>;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Period of the time-based re-evaluation (and housekeeping check).
    pub evaluation_interval: Duration,
    /// Commands that may queue before `call` waits.
    pub command_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            evaluation_interval: Duration::from_secs(60),
            command_buffer: 64,
        }
    }
}

impl DispatcherConfig {
    pub fn with_interval(evaluation_interval: Duration) -> Self {
        DispatcherConfig {
            evaluation_interval,
            ..Default::default()
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable entry point to a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    command_tx: mpsc::Sender<Command>,
    view_rx: watch::Receiver<AlertView>,
    shutdown_tx: mpsc::Sender<()>,
}

impl DispatcherHandle {
    /// Runs `f` against the workspace on the dispatcher task.
    ///
    /// Returns after the alert view reflects whatever `f` changed.
    pub async fn call<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Workspace) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command: Command = Box::new(move |workspace: &mut Workspace| {
            let result = f(workspace);
            let reply: Reply = Box::new(move || {
                let _ = reply_tx.send(result);
            });
            reply
        });

        self.command_tx
            .send(command)
            .await
            .map_err(|_| StoreError::ShuttingDown)?;
        reply_rx.await.map_err(|_| StoreError::ShuttingDown)
    }

    /// Like [`call`](Self::call) for closures that can fail.
    pub async fn try_call<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Workspace) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.call(f).await?
    }

    pub async fn add_medication(&self, draft: MedicationDraft) -> StoreResult<Medication> {
        self.try_call(move |ws| ws.store.add_medication(draft, &ws.alerts.user().user_id))
            .await
    }

    pub async fn record_movement(&self, draft: MovementDraft) -> StoreResult<Movement> {
        self.try_call(move |ws| ws.store.record_movement(draft, &ws.alerts.user().user_id))
            .await
    }

    pub async fn update_settings(&self, section: &str, updates: Value) -> StoreResult<AlertSettings> {
        let section = section.to_string();
        self.try_call(move |ws| ws.update_settings(&section, updates))
            .await
    }

    pub async fn acknowledge(&self, alert_id: &str) -> StoreResult<bool> {
        let alert_id = alert_id.to_string();
        self.try_call(move |ws| ws.alerts.acknowledge(&alert_id))
            .await
    }

    pub async fn unacknowledge(&self, alert_id: &str) -> StoreResult<bool> {
        let alert_id = alert_id.to_string();
        self.try_call(move |ws| ws.alerts.unacknowledge(&alert_id))
            .await
    }

    pub async fn acknowledge_all(&self) -> StoreResult<usize> {
        self.try_call(|ws| ws.alerts.acknowledge_all()).await
    }

    pub async fn snapshot(&self) -> StoreResult<InventorySnapshot> {
        self.call(|ws| ws.store.snapshot()).await
    }

    /// Observer of the evaluated alert view.
    pub fn alerts(&self) -> watch::Receiver<AlertView> {
        self.view_rx.clone()
    }

    pub fn current_alerts(&self) -> AlertView {
        self.view_rx.borrow().clone()
    }

    /// Asks the dispatcher to stop. Returns immediately.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

pub struct Dispatcher;

impl Dispatcher {
    /// Subscribes to every topic on `transport` and starts the task.
    ///
    /// The returned `JoinHandle` yields the workspace once the dispatcher
    /// stops.
    pub fn spawn(
        workspace: Workspace,
        transport: &dyn Transport,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> (DispatcherHandle, JoinHandle<Workspace>) {
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        let subscriptions = Topic::ALL
            .iter()
            .map(|&topic| {
                let tx = remote_tx.clone();
                let handler: Handler = Arc::new(move |payload: &Value, origin: &str| {
                    let _ = tx.send(Envelope::new(topic, payload.clone(), origin));
                });
                transport.subscribe(topic, handler)
            })
            .collect();

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (view_tx, view_rx) = watch::channel(AlertView::default());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = DispatchLoop {
            workspace,
            remote_rx,
            command_rx,
            shutdown_rx,
            subscriptions,
            evaluator: Evaluator {
                clock,
                view_tx,
                evaluated: None,
            },
            interval: config.evaluation_interval,
        };
        let join = tokio::spawn(task.run());

        let handle = DispatcherHandle {
            command_tx,
            view_rx,
            shutdown_tx,
        };
        (handle, join)
    }
}

struct DispatchLoop {
    workspace: Workspace,
    remote_rx: mpsc::UnboundedReceiver<Envelope>,
    command_rx: mpsc::Receiver<Command>,
    shutdown_rx: mpsc::Receiver<()>,
    subscriptions: Vec<Subscription>,
    evaluator: Evaluator,
    interval: Duration,
}

impl DispatchLoop {
    async fn run(self) -> Workspace {
        let DispatchLoop {
            mut workspace,
            mut remote_rx,
            mut command_rx,
            mut shutdown_rx,
            subscriptions,
            mut evaluator,
            interval,
        } = self;

        info!(
            origin = %workspace.store.origin_id(),
            user = %workspace.actor(),
            interval_secs = interval.as_secs(),
            "Dispatcher starting"
        );

        let mut tick = tokio::time::interval(interval.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(envelope) = remote_rx.recv() => {
                    if workspace.apply_remote(&envelope) {
                        trace!(topic = %envelope.topic, "Remote envelope applied");
                    }
                    evaluator.refresh(&mut workspace, false);
                }

                Some(command) = command_rx.recv() => {
                    let reply = command(&mut workspace);
                    evaluator.refresh(&mut workspace, false);
                    reply();
                }

                _ = tick.tick() => {
                    evaluator.housekeeping(&mut workspace);
                    evaluator.refresh(&mut workspace, true);
                }

                _ = shutdown_rx.recv() => {
                    info!("Dispatcher received shutdown");
                    break;
                }
            }
        }

        drop(subscriptions);
        info!("Dispatcher stopped");
        workspace
    }
}

/// Decides when to recompute and publishes the result.
struct Evaluator {
    clock: Arc<dyn Clock>,
    view_tx: watch::Sender<AlertView>,
    /// Store revision, settings revision and ack generation at the last run.
    evaluated: Option<(u64, u64, u64)>,
}

impl Evaluator {
    fn refresh(&mut self, workspace: &mut Workspace, force: bool) {
        let inputs = (
            workspace.store.revision(),
            workspace.settings.revision(),
            workspace.alerts.generation(),
        );
        if !force && self.evaluated == Some(inputs) {
            return;
        }

        let view = workspace.recompute_alerts(self.clock.now()).clone();
        self.evaluated = Some(inputs);

        let changed = self.view_tx.send_if_modified(|current| {
            if same_view(current, &view) {
                false
            } else {
                *current = view;
                true
            }
        });
        if changed {
            debug!("Alert view changed");
        }
    }

    fn housekeeping(&self, workspace: &mut Workspace) {
        let today = self.clock.now().date_naive();
        match workspace.store.run_housekeeping(today) {
            Ok(report) if !report.returns.is_empty() => {
                info!(date = %today, returns = report.returns.len(), "Expired batches returned");
            }
            Ok(_) => {}
            Err(e) => warn!(date = %today, error = %e, "Housekeeping failed"),
        }
    }
}

/// Equal when the same alerts would be shown, ignoring generation times.
fn same_view(a: &AlertView, b: &AlertView) -> bool {
    let same_alerts = |x: &[apotheca_core::Alert], y: &[apotheca_core::Alert]| {
        x.len() == y.len()
            && x.iter().zip(y).all(|(p, q)| {
                p.id == q.id && p.severity == q.severity && p.message == q.message
            })
    };
    a.quiet_hours_active == b.quiet_hours_active
        && same_alerts(&a.role_visible, &b.role_visible)
        && same_alerts(&a.visible, &b.visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_center::AlertCenter;
    use crate::clock::ManualClock;
    use crate::config_store::ConfigStore;
    use crate::store::InventoryStore;
    use apotheca_core::{Money, MovementKind, Role, UserContext};
    use apotheca_db::{InventoryData, PersistHandle, PersistOp};
    use apotheca_sync::{LocalBroadcast, RealtimeBus};
    use assert_matches::assert_matches;
    use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
    use serde_json::json;
    use std::collections::HashSet;
    use tokio::time::timeout;

    fn noon() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 5, 4, 12, 0, 0)
            .unwrap()
    }

    fn workspace(transport: Arc<dyn Transport>, role: Role) -> (Workspace, mpsc::UnboundedReceiver<PersistOp>) {
        let (persist, queue) = PersistHandle::detached();
        let ws = Workspace::new(
            InventoryStore::new(InventoryData::default(), persist.clone(), transport.clone()),
            ConfigStore::new(AlertSettings::default(), persist.clone(), transport),
            AlertCenter::new(UserContext::new("u1", role), HashSet::new(), persist),
        );
        (ws, queue)
    }

    fn low_stock_draft(name: &str) -> MedicationDraft {
        MedicationDraft {
            name: name.to_string(),
            batch: "L-1".to_string(),
            quantity: 2,
            min_stock: Some(10),
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            supplier_id: None,
            category_id: None,
            unit_price: Money::from_cents(100),
        }
    }

    async fn changed(rx: &mut watch::Receiver<AlertView>) -> AlertView {
        timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("alert view did not change")
            .expect("dispatcher gone");
        rx.borrow_and_update().clone()
    }

    #[tokio::test]
    async fn test_local_command_updates_alert_view() {
        let local = LocalBroadcast::default();
        let bus = Arc::new(RealtimeBus::in_process(&local));
        let (ws, _queue) = workspace(bus.clone(), Role::Admin);
        let clock = Arc::new(ManualClock::new(noon()));
        let (handle, _join) = Dispatcher::spawn(ws, bus.as_ref(), clock, DispatcherConfig::default());
        let mut alerts = handle.alerts();

        let med = handle.add_medication(low_stock_draft("Captopril")).await.unwrap();

        let view = changed(&mut alerts).await;
        assert!(view.is_visible(&format!("{}-low-stock", med.id)));
        assert_eq!(handle.current_alerts(), view);
    }

    #[tokio::test]
    async fn test_rejections_are_returned_to_caller() {
        let local = LocalBroadcast::default();
        let bus = Arc::new(RealtimeBus::in_process(&local));
        let (ws, _queue) = workspace(bus.clone(), Role::Pharmacist);
        let (handle, _join) = Dispatcher::spawn(
            ws,
            bus.as_ref(),
            Arc::new(ManualClock::new(noon())),
            DispatcherConfig::default(),
        );

        let err = handle
            .record_movement(MovementDraft {
                kind: MovementKind::Outbound,
                medication_id: "missing".to_string(),
                quantity: 1,
                reason: "sale".to_string(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Core(apotheca_core::CoreError::NotFound { .. }));

        let err = handle
            .update_settings("rules", json!({ "stock": false }))
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Core(apotheca_core::CoreError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_remote_envelope_reaches_workspace() {
        let local = LocalBroadcast::default();
        let bus = Arc::new(RealtimeBus::in_process(&local));
        let peer = RealtimeBus::in_process(&local);
        let (ws, _queue) = workspace(bus.clone(), Role::Admin);
        let (handle, _join) = Dispatcher::spawn(
            ws,
            bus.as_ref(),
            Arc::new(ManualClock::new(noon())),
            DispatcherConfig::default(),
        );
        let mut alerts = handle.alerts();

        peer.publish(
            Topic::MedicationAdd,
            json!({
                "id": "m1", "name": "Enalapril", "batch": "E-1", "quantity": 0,
                "minStock": 5, "expiryDate": "2030-01-01", "supplierId": null,
                "categoryId": null, "unitPrice": 50, "updatedAt": "2026-05-01T00:00:00Z"
            }),
        );

        let view = changed(&mut alerts).await;
        assert!(view.is_visible("m1-low-stock"));
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.medications.len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_through_handle() {
        let local = LocalBroadcast::default();
        let bus = Arc::new(RealtimeBus::in_process(&local));
        let (ws, _queue) = workspace(bus.clone(), Role::Admin);
        let (handle, _join) = Dispatcher::spawn(
            ws,
            bus.as_ref(),
            Arc::new(ManualClock::new(noon())),
            DispatcherConfig::default(),
        );
        let mut alerts = handle.alerts();

        let med = handle.add_medication(low_stock_draft("Atenolol")).await.unwrap();
        changed(&mut alerts).await;

        let id = format!("{}-low-stock", med.id);
        assert!(handle.acknowledge(&id).await.unwrap());
        let view = changed(&mut alerts).await;
        assert!(!view.is_visible(&id));

        assert!(handle.unacknowledge(&id).await.unwrap());
        assert!(changed(&mut alerts).await.is_visible(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_runs_housekeeping_on_new_day() {
        let local = LocalBroadcast::default();
        let bus = Arc::new(RealtimeBus::in_process(&local));
        let (mut ws, _queue) = workspace(bus.clone(), Role::Admin);
        let mut draft = low_stock_draft("Furosemida");
        draft.expiry_date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let med = ws.store.add_medication(draft, "u1").unwrap();

        let clock = Arc::new(ManualClock::new(noon()));
        let (handle, _join) = Dispatcher::spawn(
            ws,
            bus.as_ref(),
            clock.clone(),
            DispatcherConfig::default(),
        );

        // First tick fires at once: the batch expires today, not yet past.
        let batch = handle
            .call({
                let id = med.id.clone();
                move |ws| ws.store.medication(&id).map(|m| m.batch.clone())
            })
            .await
            .unwrap();
        assert_eq!(batch.as_deref(), Some("L-1"));

        clock.advance(chrono::Duration::days(1));
        tokio::time::advance(Duration::from_secs(61)).await;

        // The tick and the next command race inside select!.
        let mut returned = None;
        for _ in 0..10 {
            returned = handle.call(|ws| ws.store.last_housekeeping()).await.unwrap();
            if returned == NaiveDate::from_ymd_opt(2026, 5, 5) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(returned, NaiveDate::from_ymd_opt(2026, 5, 5));
        let ledger_len = handle
            .call(move |ws| ws.store.movements_for(&med.id).len())
            .await
            .unwrap();
        assert_eq!(ledger_len, 3);
    }

    #[tokio::test]
    async fn test_shutdown_returns_workspace_and_unsubscribes() {
        let local = LocalBroadcast::default();
        let bus = Arc::new(RealtimeBus::in_process(&local));
        let (ws, _queue) = workspace(bus.clone(), Role::Admin);
        let (handle, join) = Dispatcher::spawn(
            ws,
            bus.as_ref(),
            Arc::new(ManualClock::new(noon())),
            DispatcherConfig::default(),
        );

        handle.add_medication(low_stock_draft("Digoxina")).await.unwrap();
        handle.shutdown().await;
        let ws = join.await.unwrap();

        assert_eq!(ws.store.medications().len(), 1);
        assert_matches!(handle.snapshot().await, Err(StoreError::ShuttingDown));
    }
}
