//! # Alert Engine
//!
//! Derives operational alerts from inventory state. Everything here is a
//! pure function of its inputs; the caller supplies the clock.
//!
//! ## Evaluation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Alert Evaluation                                 │
//! │                                                                         │
//! │  medications + movements + settings + now                               │
//! │         │                                                               │
//! │         ├── role = Technician ──► technician_tasks()                    │
//! │         │                          ≤3 count tasks, ≤2 label tasks       │
//! │         │                                                               │
//! │         └── otherwise ──────────► generate()                            │
//! │                                    per medication, in order:            │
//! │                                    1. stock      (if rules.stock)       │
//! │                                    2. consumption(if rules.consumption) │
//! │                                    3. expiry     (if rules.expiry)      │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                                    visible_for_role()                   │
//! │         ┌────────────────────────────────┘                              │
//! │         ▼                                                               │
//! │  role_visible ──► quiet hours (keep High only) ──► drop acknowledged    │
//! │                                                        │                │
//! │                                                        ▼                │
//! │                                                     visible             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! An alert id is `{medicationId}-{rule}`. Recomputing with the same inputs
//! yields the same ids, which is what keeps acknowledgments attached to
//! alerts across recomputations. A condition that clears and later recurs
//! comes back under the same id, so it stays acknowledged.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use ts_rs::TS;

use crate::settings::AlertSettings;
use crate::types::{Medication, Movement, Role};
use crate::{MAX_COUNT_TASKS, MAX_LABEL_TASKS, TRAILING_WINDOW_DAYS};

// =============================================================================
// Alert Types
// =============================================================================

/// Severity, ordered Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// Rule that produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum AlertRule {
    LowStock,
    Expiring,
    Expired,
    ConsumptionTrend,
    /// Physical stock count for a medication with no recent movement.
    CountTask,
    /// Expiry labeling for a batch inside the warning window.
    LabelTask,
}

impl AlertRule {
    /// Slug used in alert ids.
    pub fn slug(&self) -> &'static str {
        match self {
            AlertRule::LowStock => "low-stock",
            AlertRule::Expiring => "expiring",
            AlertRule::Expired => "expired",
            AlertRule::ConsumptionTrend => "consumption-trend",
            AlertRule::CountTask => "count-task",
            AlertRule::LabelTask => "label-task",
        }
    }

    /// True for the stock/expiry family a pharmacist sees.
    pub fn is_stock_or_expiry(&self) -> bool {
        matches!(
            self,
            AlertRule::LowStock | AlertRule::Expiring | AlertRule::Expired
        )
    }

    /// True for synthesized technician work items.
    pub fn is_task(&self) -> bool {
        matches!(self, AlertRule::CountTask | AlertRule::LabelTask)
    }
}

/// Deterministic alert id.
pub fn alert_id(medication_id: &str, rule: AlertRule) -> String {
    format!("{}-{}", medication_id, rule.slug())
}

/// A derived alert. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub rule: AlertRule,
    pub severity: Severity,
    pub medication_id: String,
    pub medication_name: String,
    pub message: String,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

impl Alert {
    fn new(
        med: &Medication,
        rule: AlertRule,
        severity: Severity,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Alert {
            id: alert_id(&med.id, rule),
            rule,
            severity,
            medication_id: med.id.clone(),
            medication_name: med.name.clone(),
            message,
            generated_at: now,
        }
    }
}

/// Visible alert counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl AlertSummary {
    pub fn of(alerts: &[Alert]) -> Self {
        alerts.iter().fold(AlertSummary::default(), |mut acc, a| {
            match a.severity {
                Severity::High => acc.high += 1,
                Severity::Medium => acc.medium += 1,
                Severity::Low => acc.low += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// Result of one evaluation for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    /// Alerts the role may see, before quiet hours and acknowledgments.
    pub role_visible: Vec<Alert>,
    /// What the user actually sees.
    pub visible: Vec<Alert>,
    pub quiet_hours_active: bool,
    /// Role-visible alerts hidden by quiet hours.
    pub suppressed: usize,
    /// Role-visible alerts hidden because the user acknowledged them.
    pub acknowledged: usize,
    pub summary: AlertSummary,
}

impl AlertView {
    pub fn visible_ids(&self) -> Vec<&str> {
        self.visible.iter().map(|a| a.id.as_str()).collect()
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.visible.iter().any(|a| a.id == id)
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Everything one evaluation depends on.
#[derive(Debug, Clone, Copy)]
pub struct AlertInputs<'a> {
    pub medications: &'a [Medication],
    pub movements: &'a [Movement],
    pub settings: &'a AlertSettings,
    /// Local wall-clock time; the offset decides "today" and quiet hours.
    pub now: DateTime<FixedOffset>,
    pub role: Role,
    pub acknowledged: &'a HashSet<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Activity {
    inbound: i64,
    outbound: i64,
    count: usize,
}

/// Per-medication movement totals over the trailing window.
fn recent_activity<'a>(
    movements: &'a [Movement],
    now: DateTime<Utc>,
) -> HashMap<&'a str, Activity> {
    let since = now - Duration::days(TRAILING_WINDOW_DAYS);
    let mut activity: HashMap<&str, Activity> = HashMap::new();

    for m in movements.iter().filter(|m| m.timestamp >= since) {
        let entry = activity.entry(m.medication_id.as_str()).or_default();
        entry.count += 1;
        if m.is_inbound() {
            entry.inbound = entry.inbound.saturating_add(m.quantity());
        } else if m.is_outbound() {
            entry.outbound = entry.outbound.saturating_add(m.quantity());
        }
    }
    activity
}

// =============================================================================
// Rules
// =============================================================================

/// Runs the stock, consumption and expiry rules over every medication.
pub fn generate(
    medications: &[Medication],
    movements: &[Movement],
    settings: &AlertSettings,
    now: DateTime<FixedOffset>,
) -> Vec<Alert> {
    let utc_now = now.with_timezone(&Utc);
    let today = now.date_naive();
    let activity = recent_activity(movements, utc_now);
    let t = &settings.thresholds;
    let rules = &settings.rules;

    let mut alerts = Vec::new();

    for med in medications {
        // 1. Stock
        let mut stock_active = false;
        if rules.stock {
            if med.quantity <= 0 {
                stock_active = true;
                alerts.push(Alert::new(
                    med,
                    AlertRule::LowStock,
                    Severity::High,
                    "critical stock: 0 units".to_string(),
                    utc_now,
                ));
            } else {
                let min = med.effective_min(t.low_stock_fallback);
                if med.quantity <= min {
                    stock_active = true;
                    let severity = if med.quantity <= t.critical_stock_for(min) {
                        Severity::High
                    } else {
                        Severity::Medium
                    };
                    alerts.push(Alert::new(
                        med,
                        AlertRule::LowStock,
                        severity,
                        format!("low stock: {} units (minimum {})", med.quantity, min),
                        utc_now,
                    ));
                }
            }
        }

        // 2. Consumption trend
        if rules.consumption {
            let a = activity.get(med.id.as_str()).copied().unwrap_or_default();
            if a.outbound > a.inbound {
                let severity = if stock_active {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                alerts.push(Alert::new(
                    med,
                    AlertRule::ConsumptionTrend,
                    severity,
                    format!(
                        "consumption exceeds replenishment: {} out vs {} in over {} days",
                        a.outbound, a.inbound, TRAILING_WINDOW_DAYS
                    ),
                    utc_now,
                ));
            }
        }

        // 3. Expiry
        if rules.expiry {
            if med.is_expired(today) {
                alerts.push(Alert::new(
                    med,
                    AlertRule::Expired,
                    Severity::High,
                    format!("expired on {}", med.expiry_date),
                    utc_now,
                ));
            } else {
                let days = med.days_to_expiry(today);
                if days <= t.expiry_days {
                    let severity = if days <= t.critical_expiry_days || stock_active {
                        Severity::High
                    } else {
                        Severity::Medium
                    };
                    alerts.push(Alert::new(
                        med,
                        AlertRule::Expiring,
                        severity,
                        format!("expires in {} day(s) on {}", days, med.expiry_date),
                        utc_now,
                    ));
                }
            }
        }
    }

    alerts
}

/// Synthesizes technician work items.
///
/// Up to three medications with no movement in the trailing window get a
/// physical-count task; up to two batches inside the expiry warning window
/// get a labeling task. Selection follows the store's medication order.
pub fn technician_tasks(
    medications: &[Medication],
    movements: &[Movement],
    settings: &AlertSettings,
    now: DateTime<FixedOffset>,
) -> Vec<Alert> {
    let utc_now = now.with_timezone(&Utc);
    let today = now.date_naive();
    let activity = recent_activity(movements, utc_now);

    let counts = medications
        .iter()
        .filter(|m| !activity.contains_key(m.id.as_str()))
        .take(MAX_COUNT_TASKS)
        .map(|m| {
            Alert::new(
                m,
                AlertRule::CountTask,
                Severity::Low,
                format!(
                    "physical count: batch {} has no movements in {} days",
                    m.batch, TRAILING_WINDOW_DAYS
                ),
                utc_now,
            )
        });

    let labels = medications
        .iter()
        .filter(|m| !m.is_expired(today) && m.days_to_expiry(today) <= settings.thresholds.expiry_days)
        .take(MAX_LABEL_TASKS)
        .map(|m| {
            Alert::new(
                m,
                AlertRule::LabelTask,
                Severity::Medium,
                format!("label batch {}: expires on {}", m.batch, m.expiry_date),
                utc_now,
            )
        });

    counts.chain(labels).collect()
}

/// Whether `role` may see alerts produced by `rule`.
pub fn visible_for_role(rule: AlertRule, role: Role) -> bool {
    match role {
        Role::Admin => !rule.is_task(),
        Role::Pharmacist => rule.is_stock_or_expiry(),
        Role::Technician => rule.is_task(),
    }
}

/// True when quiet hours are on and `now` falls inside the window.
pub fn in_quiet_hours(settings: &AlertSettings, now: DateTime<FixedOffset>) -> bool {
    settings.quiet_hours.contains(now.time())
}

/// Full pipeline: rules → role → quiet hours → acknowledgments.
pub fn evaluate(inputs: &AlertInputs<'_>) -> AlertView {
    let role_visible: Vec<Alert> = match inputs.role {
        Role::Technician => technician_tasks(
            inputs.medications,
            inputs.movements,
            inputs.settings,
            inputs.now,
        ),
        role => generate(
            inputs.medications,
            inputs.movements,
            inputs.settings,
            inputs.now,
        )
        .into_iter()
        .filter(|a| visible_for_role(a.rule, role))
        .collect(),
    };

    let quiet = in_quiet_hours(inputs.settings, inputs.now);
    filter_view(role_visible, quiet, inputs.acknowledged)
}

/// Applies quiet-hours suppression and acknowledgments to already
/// role-filtered alerts.
///
/// Acknowledging or un-acknowledging only needs this step, not a full
/// regeneration.
pub fn filter_view(role_visible: Vec<Alert>, quiet: bool, acknowledged_ids: &HashSet<String>) -> AlertView {
    let mut suppressed = 0;
    let mut acknowledged = 0;
    let mut visible = Vec::with_capacity(role_visible.len());

    for alert in &role_visible {
        if quiet && alert.severity < Severity::High {
            suppressed += 1;
        } else if acknowledged_ids.contains(&alert.id) {
            acknowledged += 1;
        } else {
            visible.push(alert.clone());
        }
    }

    let summary = AlertSummary::of(&visible);
    AlertView {
        role_visible,
        visible,
        quiet_hours_active: quiet,
        suppressed,
        acknowledged,
        summary,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::settings::QuietHours;
    use crate::types::MovementKind;
    use chrono::{NaiveTime, TimeZone};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    fn now() -> DateTime<FixedOffset> {
        at(2026, 3, 10, 14, 0)
    }

    fn med(id: &str, quantity: i64, min_stock: Option<i64>, expires_in_days: i64) -> Medication {
        Medication {
            id: id.into(),
            name: format!("Med {}", id),
            batch: format!("B-{}", id),
            quantity,
            min_stock,
            expiry_date: now().date_naive() + Duration::days(expires_in_days),
            supplier_id: None,
            category_id: None,
            unit_price: Money::from_cents(100),
            updated_at: Utc::now(),
        }
    }

    fn movement(med_id: &str, delta: i64, days_ago: i64) -> Movement {
        Movement {
            id: crate::types::new_id(),
            medication_id: med_id.into(),
            kind: if delta > 0 {
                MovementKind::Inbound
            } else {
                MovementKind::Outbound
            },
            delta,
            reason: "test".into(),
            actor: "u1".into(),
            timestamp: now().with_timezone(&Utc) - Duration::days(days_ago),
            synthesized: false,
        }
    }

    fn find<'a>(alerts: &'a [Alert], id: &str) -> Option<&'a Alert> {
        alerts.iter().find(|a| a.id == id)
    }

    fn inputs<'a>(
        meds: &'a [Medication],
        movements: &'a [Movement],
        settings: &'a AlertSettings,
        role: Role,
        acks: &'a HashSet<String>,
    ) -> AlertInputs<'a> {
        AlertInputs {
            medications: meds,
            movements,
            settings,
            now: now(),
            role,
            acknowledged: acks,
        }
    }

    #[test]
    fn test_zero_stock_is_high() {
        let meds = vec![med("a", 0, Some(10), 365)];
        let alerts = generate(&meds, &[], &AlertSettings::default(), now());
        let a = find(&alerts, "a-low-stock").unwrap();
        assert_eq!(a.severity, Severity::High);
        assert_eq!(a.message, "critical stock: 0 units");
    }

    #[test]
    fn test_stock_at_default_critical_threshold_is_high() {
        // min 10, critical unset → ceil(10/2) = 5; 5 <= 5
        let meds = vec![med("a", 5, Some(10), 365)];
        let alerts = generate(&meds, &[], &AlertSettings::default(), now());
        assert_eq!(find(&alerts, "a-low-stock").unwrap().severity, Severity::High);
    }

    #[test]
    fn test_stock_above_critical_is_medium_and_fallback_applies() {
        let meds = vec![med("a", 6, Some(10), 365), med("b", 8, None, 365)];
        let alerts = generate(&meds, &[], &AlertSettings::default(), now());
        assert_eq!(find(&alerts, "a-low-stock").unwrap().severity, Severity::Medium);
        // b: fallback minimum 10, 8 <= 10, critical 5
        assert_eq!(find(&alerts, "b-low-stock").unwrap().severity, Severity::Medium);

        let healthy = vec![med("c", 11, None, 365)];
        assert!(generate(&healthy, &[], &AlertSettings::default(), now()).is_empty());
    }

    #[test]
    fn test_expiring_within_critical_window_is_high() {
        let meds = vec![med("a", 100, Some(10), 5)];
        let alerts = generate(&meds, &[], &AlertSettings::default(), now());
        let a = find(&alerts, "a-expiring").unwrap();
        assert_eq!(a.severity, Severity::High);
    }

    #[test]
    fn test_expiring_outside_critical_window_is_medium_unless_stock_low() {
        let meds = vec![med("a", 100, Some(10), 20), med("b", 8, Some(10), 20)];
        let alerts = generate(&meds, &[], &AlertSettings::default(), now());
        assert_eq!(find(&alerts, "a-expiring").unwrap().severity, Severity::Medium);
        // Escalated because the stock rule is also active for b
        assert_eq!(find(&alerts, "b-expiring").unwrap().severity, Severity::High);
    }

    #[test]
    fn test_expired_excludes_expiring() {
        let meds = vec![med("a", 100, Some(10), -1)];
        let alerts = generate(&meds, &[], &AlertSettings::default(), now());
        assert_eq!(find(&alerts, "a-expired").unwrap().severity, Severity::High);
        assert!(find(&alerts, "a-expiring").is_none());

        // Expiring today is still "expiring"
        let today = vec![med("b", 100, Some(10), 0)];
        let alerts = generate(&today, &[], &AlertSettings::default(), now());
        assert!(find(&alerts, "b-expiring").is_some());
    }

    #[test]
    fn test_consumption_trend() {
        let meds = vec![med("a", 50, Some(10), 365), med("b", 5, Some(10), 365)];
        let movements = vec![
            movement("a", 10, 20),
            movement("a", -15, 3),
            movement("a", -30, 45), // outside window
            movement("b", -4, 1),
        ];
        let alerts = generate(&meds, &movements, &AlertSettings::default(), now());
        assert_eq!(
            find(&alerts, "a-consumption-trend").unwrap().severity,
            Severity::Low
        );
        // b is also under the stock rule
        assert_eq!(
            find(&alerts, "b-consumption-trend").unwrap().severity,
            Severity::Medium
        );
    }

    #[test]
    fn test_extreme_ledger_values_saturate() {
        let meds = vec![med("a", i64::MAX, Some(i64::MAX), 365)];
        let movements = vec![
            movement("a", i64::MIN, 1),
            movement("a", i64::MIN, 2),
            movement("a", 5, 3),
        ];
        let alerts = generate(&meds, &movements, &AlertSettings::default(), now());
        let trend = find(&alerts, "a-consumption-trend").unwrap();
        assert!(trend.message.contains(&i64::MAX.to_string()));
    }

    #[test]
    fn test_rule_toggles() {
        let meds = vec![med("a", 0, Some(10), -3)];
        let mut settings = AlertSettings::default();
        settings.rules.stock = false;
        let alerts = generate(&meds, &[], &settings, now());
        assert!(find(&alerts, "a-low-stock").is_none());
        assert!(find(&alerts, "a-expired").is_some());

        settings.rules.expiry = false;
        assert!(generate(&meds, &[], &settings, now()).is_empty());
    }

    #[test]
    fn test_disabled_stock_rule_does_not_escalate_expiry() {
        let meds = vec![med("a", 2, Some(10), 20)];
        let mut settings = AlertSettings::default();
        settings.rules.stock = false;
        let alerts = generate(&meds, &[], &settings, now());
        assert_eq!(find(&alerts, "a-expiring").unwrap().severity, Severity::Medium);
    }

    #[test]
    fn test_determinism() {
        let meds = vec![med("a", 3, Some(10), 10), med("b", 0, None, -2)];
        let movements = vec![movement("a", -5, 2)];
        let settings = AlertSettings::default();
        let first = generate(&meds, &movements, &settings, now());
        let second = generate(&meds, &movements, &settings, now());
        let key = |v: &[Alert]| {
            v.iter()
                .map(|a| (a.id.clone(), a.severity))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&first), key(&second));
    }

    #[test]
    fn test_role_visibility() {
        let meds = vec![med("a", 2, Some(10), -1)];
        let movements = vec![movement("a", -3, 1)];
        let settings = AlertSettings::default();
        let acks = HashSet::new();

        let admin = evaluate(&inputs(&meds, &movements, &settings, Role::Admin, &acks));
        assert!(admin.is_visible("a-consumption-trend"));
        assert!(admin.is_visible("a-low-stock"));

        let pharmacist = evaluate(&inputs(&meds, &movements, &settings, Role::Pharmacist, &acks));
        assert!(!pharmacist.is_visible("a-consumption-trend"));
        assert!(pharmacist.is_visible("a-expired"));

        let tech = evaluate(&inputs(&meds, &movements, &settings, Role::Technician, &acks));
        assert!(tech.visible.iter().all(|a| a.rule.is_task()));
    }

    #[test]
    fn test_technician_task_limits() {
        let meds: Vec<Medication> = (0..6)
            .map(|i| med(&format!("m{}", i), 100, Some(10), 10))
            .collect();
        let movements = vec![movement("m0", 5, 2)];
        let tasks = technician_tasks(&meds, &movements, &AlertSettings::default(), now());

        let counts: Vec<_> = tasks.iter().filter(|a| a.rule == AlertRule::CountTask).collect();
        let labels: Vec<_> = tasks.iter().filter(|a| a.rule == AlertRule::LabelTask).collect();
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[0].medication_id, "m1");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].id, "m0-label-task");
    }

    #[test]
    fn test_quiet_hours_keep_only_high() {
        let meds = vec![med("hi", 0, Some(10), 365), med("mid", 8, Some(10), 365)];
        let mut settings = AlertSettings::default();
        settings.quiet_hours = QuietHours {
            enabled: true,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        };
        let acks = HashSet::new();

        let mut night = inputs(&meds, &[], &settings, Role::Admin, &acks);
        night.now = at(2026, 3, 10, 23, 30);
        let view = evaluate(&night);
        assert!(view.quiet_hours_active);
        assert_eq!(view.visible_ids(), vec!["hi-low-stock"]);
        assert_eq!(view.suppressed, 1);
        assert_eq!(view.role_visible.len(), 2);

        let mut morning = night;
        morning.now = at(2026, 3, 11, 9, 0);
        let view = evaluate(&morning);
        assert!(!view.quiet_hours_active);
        assert_eq!(view.visible.len(), 2);
    }

    #[test]
    fn test_acknowledged_alerts_hidden() {
        let meds = vec![med("a", 0, Some(10), 365)];
        let settings = AlertSettings::default();
        let acks: HashSet<String> = ["a-low-stock".to_string()].into_iter().collect();
        let view = evaluate(&inputs(&meds, &[], &settings, Role::Admin, &acks));
        assert!(view.visible.is_empty());
        assert_eq!(view.acknowledged, 1);
        assert_eq!(view.role_visible.len(), 1);
    }

    #[test]
    fn test_summary_counts() {
        let meds = vec![med("a", 0, Some(10), 365), med("b", 7, Some(10), 20)];
        let settings = AlertSettings::default();
        let acks = HashSet::new();
        let view = evaluate(&inputs(&meds, &[], &settings, Role::Admin, &acks));
        assert_eq!(view.summary.high, 2); // a stock, b expiring escalated
        assert_eq!(view.summary.medium, 1); // b stock
        assert_eq!(view.summary.total(), 3);
    }
}
