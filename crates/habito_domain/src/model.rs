use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ids are stringified on ingest; numeric server ids arrive as `"42"`.
pub type HabitId = String;

/// Per habit, per canonical day: how often the habit was logged.
/// Missing entries are equivalent to a count of zero.
pub type CompletionLog = HashMap<HabitId, BTreeMap<DateKey, u32>>;

/// Canonical `YYYY-MM-DD` key for one local calendar day.
///
/// All period windows compare these keys as strings; the ordering of the
/// wrapped string matches chronological ordering by construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateKey(String);

impl DateKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    /// Tolerant parse; anything that is not a calendar day yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .ok()
            .map(Self::from_date)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, "%Y-%m-%d").ok()
    }

    /// `YYYY-MM`, the prefix shared by every key in the same calendar month.
    pub fn month_prefix(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }

    /// `YYYY`, the prefix shared by every key in the same calendar year.
    pub fn year_prefix(&self) -> &str {
        self.0.get(..4).unwrap_or(&self.0)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Success polarity of a habit: reaching the target is success for `Good`,
/// staying under the ceiling is success for `Bad`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HabitKind {
    #[default]
    Good,
    Bad,
}

impl HabitKind {
    pub fn from_label(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("bad") {
            Self::Bad
        } else {
            Self::Good
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Bad => "bad",
        }
    }
}

impl Serialize for HabitKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for HabitKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_label(&raw))
    }
}

/// Recurrence of a habit. `Daily` and `PerDay` share the one-day period;
/// only `PerDay` consults the numeric per-day target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Frequency {
    #[default]
    Daily,
    PerDay,
    PerWeek,
    PerMonth,
    PerYear,
}

impl Frequency {
    /// Decodes canonical labels plus the legacy wire labels still emitted by
    /// older backends. Unrecognized values fall back to daily semantics.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim() {
            "per_day" | "pro_tag" => Self::PerDay,
            "per_week" | "pro_woche" => Self::PerWeek,
            "per_month" | "pro_monat" => Self::PerMonth,
            "per_year" | "pro_jahr" => Self::PerYear,
            _ => Self::Daily,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::PerDay => "per_day",
            Self::PerWeek => "per_week",
            Self::PerMonth => "per_month",
            Self::PerYear => "per_year",
        }
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_label(&raw))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    #[serde(deserialize_with = "ids::one", default)]
    pub id: HabitId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: HabitKind,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub times_per_day: Option<u32>,
    #[serde(default)]
    pub times_per_week: Option<u32>,
    #[serde(default)]
    pub times_per_month: Option<u32>,
    #[serde(default)]
    pub times_per_year: Option<u32>,
    #[serde(deserialize_with = "ids::optional", default)]
    pub group_id: Option<String>,
    /// Legacy payloads reference the group by display name only.
    #[serde(rename = "group", default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(deserialize_with = "ids::many", default)]
    pub linked_ids: Vec<HabitId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    #[serde(deserialize_with = "ids::one", default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    #[serde(deserialize_with = "ids::one", default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub done: bool,
}

/// Backends disagree on whether ids are JSON strings or bare numbers;
/// everything is stringified on ingest.
mod ids {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Text(String),
        Number(i64),
    }

    impl From<IdRepr> for String {
        fn from(repr: IdRepr) -> Self {
            match repr {
                IdRepr::Text(text) => text,
                IdRepr::Number(number) => number.to_string(),
            }
        }
    }

    pub fn one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        IdRepr::deserialize(deserializer).map(String::from)
    }

    pub fn optional<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Option::<IdRepr>::deserialize(deserializer).map(|repr| repr.map(String::from))
    }

    pub fn many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Vec::<IdRepr>::deserialize(deserializer)
            .map(|reprs| reprs.into_iter().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_key_orders_chronologically() {
        let early = DateKey::parse("2025-01-31").unwrap();
        let late = DateKey::parse("2025-02-01").unwrap();
        assert!(early < late);
        assert_eq!(early.month_prefix(), "2025-01");
        assert_eq!(early.year_prefix(), "2025");
    }

    #[test]
    fn date_key_rejects_garbage() {
        assert!(DateKey::parse("not a day").is_none());
        assert!(DateKey::parse("2025-13-40").is_none());
        assert!(DateKey::parse("").is_none());
    }

    #[test]
    fn frequency_decodes_legacy_labels_and_falls_back_to_daily() {
        assert_eq!(Frequency::from_label("pro_woche"), Frequency::PerWeek);
        assert_eq!(Frequency::from_label("per_month"), Frequency::PerMonth);
        assert_eq!(Frequency::from_label("every_other_day"), Frequency::Daily);
        assert_eq!(Frequency::from_label(""), Frequency::Daily);
    }

    #[test]
    fn numeric_ids_are_stringified_on_ingest() {
        let habit: Habit =
            serde_json::from_str(r#"{"id": 7, "name": "Jog", "group_id": 3, "linked_ids": [3, 9]}"#)
                .unwrap();
        assert_eq!(habit.id, "7");
        assert_eq!(habit.group_id.as_deref(), Some("3"));
        assert_eq!(habit.linked_ids, vec!["3".to_string(), "9".to_string()]);

        let group: Group = serde_json::from_str(r#"{"id": 12, "name": "Health"}"#).unwrap();
        assert_eq!(group.id, "12");

        let todo: Todo = serde_json::from_str(r#"{"id": 5, "name": "Taxes"}"#).unwrap();
        assert_eq!(todo.id, "5");
    }

    #[test]
    fn null_group_id_stays_absent() {
        let habit: Habit =
            serde_json::from_str(r#"{"id": "1", "name": "Jog", "group_id": null}"#).unwrap();
        assert!(habit.group_id.is_none());
    }

    #[test]
    fn habit_deserializes_sparse_payload() {
        let raw = r#"{
            "id": "7",
            "name": "Stretch",
            "type": "bad",
            "frequency": "pro_tag",
            "times_per_day": 2,
            "group": "Health"
        }"#;
        let habit: Habit = serde_json::from_str(raw).unwrap();
        assert_eq!(habit.kind, HabitKind::Bad);
        assert_eq!(habit.frequency, Frequency::PerDay);
        assert_eq!(habit.times_per_day, Some(2));
        assert_eq!(habit.group_name.as_deref(), Some("Health"));
        assert!(habit.group_id.is_none());
        assert!(habit.linked_ids.is_empty());
    }
}
