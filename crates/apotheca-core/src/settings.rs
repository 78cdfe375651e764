//! # Alert Settings
//!
//! Thresholds, per-rule toggles and the quiet-hours window consumed by the
//! alert engine. Administrators change one section at a time; each change
//! travels as a `config.update` envelope `{ section, updates }`.
//!
//! ## Sections
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "thresholds"   lowStockFallback  criticalStock  expiryDays            │
//! │                 criticalExpiryDays                                      │
//! │  "rules"        stock  expiry  consumption                              │
//! │  "quietHours"   enabled  start ("HH:MM")  end ("HH:MM")                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Malformed settings never make evaluation fail: `sanitized()` and
//! `from_json_lenient()` fall back to defaults field by field.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::Validate;

// =============================================================================
// Defaults
// =============================================================================

fn default_low_stock_fallback() -> i64 {
    10
}

fn default_expiry_days() -> i64 {
    30
}

fn default_critical_expiry_days() -> i64 {
    7
}

fn default_true() -> bool {
    true
}

fn default_quiet_start() -> NaiveTime {
    NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default()
}

fn default_quiet_end() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default()
}

/// Longest warning window accepted, in days.
const MAX_WINDOW_DAYS: i64 = 3650;

// =============================================================================
// Sections
// =============================================================================

/// Numeric thresholds for the stock and expiry rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    /// Minimum stock for medications without their own `minStock`.
    #[serde(default = "default_low_stock_fallback")]
    pub low_stock_fallback: i64,

    /// Units at or below which low stock becomes high severity.
    /// `None` means ceil(effective minimum / 2).
    #[serde(default)]
    pub critical_stock: Option<i64>,

    /// Days before expiry at which the expiring alert starts.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,

    /// Days before expiry at which an expiring alert is high severity.
    #[serde(default = "default_critical_expiry_days")]
    pub critical_expiry_days: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_stock_fallback: default_low_stock_fallback(),
            critical_stock: None,
            expiry_days: default_expiry_days(),
            critical_expiry_days: default_critical_expiry_days(),
        }
    }
}

impl Thresholds {
    /// Critical sub-threshold for a given effective minimum.
    pub fn critical_stock_for(&self, effective_min: i64) -> i64 {
        match self.critical_stock {
            Some(units) => units,
            None => effective_min.saturating_add(1) / 2,
        }
    }
}

/// Enable flags per rule family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RuleToggles {
    #[serde(default = "default_true")]
    pub stock: bool,
    #[serde(default = "default_true")]
    pub expiry: bool,
    #[serde(default = "default_true")]
    pub consumption: bool,
}

impl Default for RuleToggles {
    fn default() -> Self {
        Self {
            stock: true,
            expiry: true,
            consumption: true,
        }
    }
}

/// Window during which only high-severity alerts stay visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QuietHours {
    #[serde(default)]
    pub enabled: bool,

    #[ts(as = "String")]
    #[serde(default = "default_quiet_start", with = "hhmm")]
    pub start: NaiveTime,

    #[ts(as = "String")]
    #[serde(default = "default_quiet_end", with = "hhmm")]
    pub end: NaiveTime,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_quiet_start(),
            end: default_quiet_end(),
        }
    }
}

impl QuietHours {
    /// True when `time` falls inside the window.
    ///
    /// `end <= start` spans midnight, so 22:00–08:00 covers 23:30 and 03:00
    /// but not 09:00. A zero-length window (start == end) covers the day.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// "HH:MM" (or "HH:MM:SS") wall-clock times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Alert Settings
// =============================================================================

/// The full configuration object consumed by the alert engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AlertSettings {
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub rules: RuleToggles,
    #[serde(default)]
    pub quiet_hours: QuietHours,
}

/// One independently-updatable part of [`AlertSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsSection {
    Thresholds,
    Rules,
    QuietHours,
}

impl SettingsSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsSection::Thresholds => "thresholds",
            SettingsSection::Rules => "rules",
            SettingsSection::QuietHours => "quietHours",
        }
    }
}

impl fmt::Display for SettingsSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingsSection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thresholds" => Ok(SettingsSection::Thresholds),
            "rules" => Ok(SettingsSection::Rules),
            "quietHours" | "quiet_hours" => Ok(SettingsSection::QuietHours),
            other => Err(ValidationError::InvalidFormat {
                field: "section".to_string(),
                reason: format!("unknown section '{}'", other),
            }),
        }
    }
}

impl AlertSettings {
    /// Decodes persisted or replicated settings, never failing.
    ///
    /// Each field is taken on its own: a field that is missing, unknown or
    /// of the wrong type keeps its default without discarding its siblings.
    pub fn from_json_lenient(value: &Value) -> AlertSettings {
        let section = |name: &str| value.as_object().and_then(|fields| fields.get(name));
        AlertSettings {
            thresholds: lenient_section(SettingsSection::Thresholds, section("thresholds")),
            rules: lenient_section(SettingsSection::Rules, section("rules")),
            quiet_hours: lenient_section(SettingsSection::QuietHours, section("quietHours")),
        }
        .sanitized()
    }

    /// Replaces out-of-range values with their defaults.
    pub fn sanitized(mut self) -> AlertSettings {
        let defaults = Thresholds::default();
        let t = &mut self.thresholds;
        if t.low_stock_fallback < 0 {
            t.low_stock_fallback = defaults.low_stock_fallback;
        }
        if matches!(t.critical_stock, Some(units) if units < 0) {
            t.critical_stock = None;
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&t.expiry_days) {
            t.expiry_days = defaults.expiry_days;
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&t.critical_expiry_days) {
            t.critical_expiry_days = defaults.critical_expiry_days;
        }
        self
    }

    /// Returns a copy with one section's fields overwritten by `updates`.
    ///
    /// `updates` must be a JSON object whose keys exist in the section.
    pub fn with_section(
        &self,
        section: SettingsSection,
        updates: &Value,
    ) -> Result<AlertSettings, ValidationError> {
        let mut next = self.clone();
        match section {
            SettingsSection::Thresholds => {
                next.thresholds = merge_section(section, &self.thresholds, updates)?
            }
            SettingsSection::Rules => next.rules = merge_section(section, &self.rules, updates)?,
            SettingsSection::QuietHours => {
                next.quiet_hours = merge_section(section, &self.quiet_hours, updates)?
            }
        }
        Ok(next)
    }

    /// Current value of one section as JSON.
    pub fn section_json(&self, section: SettingsSection) -> Value {
        let value = match section {
            SettingsSection::Thresholds => serde_json::to_value(&self.thresholds),
            SettingsSection::Rules => serde_json::to_value(&self.rules),
            SettingsSection::QuietHours => serde_json::to_value(&self.quiet_hours),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Overlays the decodable fields of `raw` on the section's defaults, one
/// field at a time.
fn lenient_section<T>(section: SettingsSection, raw: Option<&Value>) -> T
where
    T: Default + Serialize + serde::de::DeserializeOwned,
{
    let mut current = T::default();
    let Some(fields) = raw.and_then(Value::as_object) else {
        return current;
    };
    for (key, value) in fields {
        let single = Value::Object(serde_json::Map::from_iter([(key.clone(), value.clone())]));
        if let Ok(next) = merge_section(section, &current, &single) {
            current = next;
        }
    }
    current
}

fn merge_section<T>(section: SettingsSection, current: &T, updates: &Value) -> Result<T, ValidationError>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let invalid = |reason: String| ValidationError::InvalidFormat {
        field: section.as_str().to_string(),
        reason,
    };

    let updates = updates
        .as_object()
        .ok_or_else(|| invalid("updates must be an object".to_string()))?;

    let mut merged = serde_json::to_value(current).map_err(|e| invalid(e.to_string()))?;
    let fields = merged
        .as_object_mut()
        .ok_or_else(|| invalid("section is not an object".to_string()))?;

    for (key, value) in updates {
        if !fields.contains_key(key) {
            return Err(invalid(format!("unknown field '{}'", key)));
        }
        fields.insert(key.clone(), value.clone());
    }

    serde_json::from_value(merged).map_err(|e| invalid(e.to_string()))
}

impl Validate for AlertSettings {
    type Output = AlertSettings;

    fn validate(self) -> Result<Self::Output, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let t = &self.thresholds;

        let mut range = |field: &str, value: i64, max: i64| {
            if !(0..=max).contains(&value) {
                errors.push(ValidationError::OutOfRange {
                    field: field.to_string(),
                    min: 0,
                    max,
                });
            }
        };
        range("lowStockFallback", t.low_stock_fallback, i64::MAX);
        if let Some(units) = t.critical_stock {
            range("criticalStock", units, i64::MAX);
        }
        range("expiryDays", t.expiry_days, MAX_WINDOW_DAYS);
        range("criticalExpiryDays", t.critical_expiry_days, MAX_WINDOW_DAYS);

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_defaults() {
        let s = AlertSettings::default();
        assert_eq!(s.thresholds.expiry_days, 30);
        assert_eq!(s.thresholds.critical_expiry_days, 7);
        assert!(s.rules.stock && s.rules.expiry && s.rules.consumption);
        assert!(!s.quiet_hours.enabled);
    }

    #[test]
    fn test_critical_stock_defaults_to_half_rounded_up() {
        let t = Thresholds::default();
        assert_eq!(t.critical_stock_for(10), 5);
        assert_eq!(t.critical_stock_for(7), 4);
        let fixed = Thresholds {
            critical_stock: Some(2),
            ..Thresholds::default()
        };
        assert_eq!(fixed.critical_stock_for(10), 2);
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        let q = QuietHours {
            enabled: true,
            start: hm(22, 0),
            end: hm(8, 0),
        };
        assert!(q.contains(hm(23, 30)));
        assert!(q.contains(hm(3, 0)));
        assert!(!q.contains(hm(9, 0)));
        assert!(!q.contains(hm(8, 0)));
    }

    #[test]
    fn test_quiet_hours_same_day_and_disabled() {
        let q = QuietHours {
            enabled: true,
            start: hm(12, 0),
            end: hm(14, 0),
        };
        assert!(q.contains(hm(13, 0)));
        assert!(!q.contains(hm(15, 0)));

        let off = QuietHours { enabled: false, ..q };
        assert!(!off.contains(hm(13, 0)));
    }

    #[test]
    fn test_with_section_merges_fields() {
        let s = AlertSettings::default();
        let next = s
            .with_section(
                SettingsSection::QuietHours,
                &json!({ "enabled": true, "start": "21:30" }),
            )
            .unwrap();
        assert!(next.quiet_hours.enabled);
        assert_eq!(next.quiet_hours.start, hm(21, 30));
        assert_eq!(next.quiet_hours.end, hm(7, 0));
        assert_eq!(next.thresholds, s.thresholds);
    }

    #[test]
    fn test_with_section_rejects_unknown_field_and_bad_value() {
        let s = AlertSettings::default();
        assert_matches!(
            s.with_section(SettingsSection::Rules, &json!({ "sound": true })),
            Err(ValidationError::InvalidFormat { .. })
        );
        assert_matches!(
            s.with_section(SettingsSection::Thresholds, &json!({ "expiryDays": "soon" })),
            Err(ValidationError::InvalidFormat { .. })
        );
        assert!("alarms".parse::<SettingsSection>().is_err());
    }

    #[test]
    fn test_lenient_decode_falls_back() {
        let s = AlertSettings::from_json_lenient(&json!({
            "thresholds": { "expiryDays": -4, "criticalStock": -1 }
        }));
        assert_eq!(s.thresholds.expiry_days, 30);
        assert_eq!(s.thresholds.critical_stock, None);

        let garbage = AlertSettings::from_json_lenient(&json!("not an object"));
        assert_eq!(garbage, AlertSettings::default());
    }

    #[test]
    fn test_lenient_decode_keeps_good_fields_next_to_bad_ones() {
        let s = AlertSettings::from_json_lenient(&json!({
            "thresholds": { "expiryDays": "x", "criticalExpiryDays": 3 },
            "rules": { "stock": false, "consumption": "maybe" },
            "quietHours": { "enabled": true, "start": "25:99", "end": "06:30" }
        }));
        assert_eq!(s.thresholds.expiry_days, 30);
        assert_eq!(s.thresholds.critical_expiry_days, 3);
        assert!(!s.rules.stock);
        assert!(s.rules.consumption);
        assert!(s.quiet_hours.enabled);
        assert_eq!(s.quiet_hours.start, hm(22, 0));
        assert_eq!(s.quiet_hours.end, hm(6, 30));

        let garbage = AlertSettings::from_json_lenient(&json!({ "rules": 7 }));
        assert_eq!(garbage, AlertSettings::default());
    }

    #[test]
    fn test_validate_rejects_negative() {
        let mut s = AlertSettings::default();
        s.thresholds.critical_expiry_days = -1;
        let errors = s.validate().unwrap_err();
        assert_eq!(errors[0].field(), "criticalExpiryDays");
    }
}
