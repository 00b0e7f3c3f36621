use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::calendar::day_key;
use crate::links::is_habit_done;
use crate::model::{CompletionLog, DateKey, Frequency, Group, Habit, HabitId, Todo};
use crate::progress::{limit_for, period_count};
use crate::streak::calculate_streak;

pub const HABITS_KEY: &str = "habito.habits";
pub const GROUPS_KEY: &str = "habito.groups";
pub const TODOS_KEY: &str = "habito.todos";
pub const COMPLETIONS_KEY: &str = "habito.completions";

/// Immutable view of everything the presentation layer needs. The service
/// hands out clones; nothing downstream can mutate shared state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub habits: Vec<Habit>,
    pub groups: Vec<Group>,
    pub todos: Vec<Todo>,
    pub completions: CompletionLog,
}

/// One persisted completion counter as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRow {
    pub date: DateKey,
    pub count: u32,
}

/// Achieved count and target for a habit's current period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub achieved: u32,
    pub target: u32,
}

/// Shape of an exported backup file.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportPayload {
    pub habits: Vec<ImportedHabit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportedHabit {
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub goal: Option<u32>,
    #[serde(default)]
    pub logs: Vec<ImportedLog>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportedLog {
    #[serde(default)]
    pub value: Option<u32>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub merged: usize,
}

/// The remote persistence collaborator. Implementations live outside the
/// core; every method may fail and the service degrades when one does.
pub trait HabitBackend: Send + Sync {
    fn fetch_habits(&self) -> Result<Vec<Habit>>;
    fn fetch_groups(&self) -> Result<Vec<Group>>;
    fn fetch_todos(&self) -> Result<Vec<Todo>>;
    fn fetch_completions(&self, habit_id: &str) -> Result<Vec<CompletionRow>>;
    fn record_completion(&self, habit_id: &str, date: &DateKey) -> Result<()>;
    fn clear_completions(&self, habit_id: &str, date: &DateKey) -> Result<()>;
    /// Returns the server-assigned id when a new habit was created.
    fn save_habit(&self, habit: &Habit) -> Result<Option<HabitId>>;
    fn delete_habit(&self, habit_id: &str) -> Result<()>;
    fn save_todo(&self, todo: &Todo) -> Result<Option<String>>;
    fn delete_todo(&self, todo_id: &str) -> Result<()>;
}

pub struct HabitService {
    state: RwLock<Snapshot>,
    backend: Option<Box<dyn HabitBackend>>,
    cache: Option<CacheStore>,
}

pub struct HabitServiceBuilder {
    backend: Option<Box<dyn HabitBackend>>,
    cache: Option<CacheStore>,
}

impl HabitServiceBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            cache: None,
        }
    }

    pub fn with_backend(mut self, backend: Box<dyn HabitBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> HabitService {
        let service = HabitService {
            state: RwLock::new(Snapshot::default()),
            backend: self.backend,
            cache: self.cache,
        };
        service.refresh_all();
        service
    }
}

impl Default for HabitServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HabitService {
    pub fn builder() -> HabitServiceBuilder {
        HabitServiceBuilder::new()
    }

    /// Rebuilds the snapshot from the backend, falling back to the cached
    /// copy per collection when a fetch fails, and mirrors the result back
    /// into the cache. Returns the fresh snapshot.
    pub fn refresh_all(&self) -> Snapshot {
        let mut habits: Vec<Habit> =
            self.fetch_or_cached("habits", HABITS_KEY, |backend| backend.fetch_habits());
        let groups: Vec<Group> =
            self.fetch_or_cached("groups", GROUPS_KEY, |backend| backend.fetch_groups());
        let todos: Vec<Todo> =
            self.fetch_or_cached("todos", TODOS_KEY, |backend| backend.fetch_todos());
        reconcile_group_ids(&mut habits, &groups);

        let cached_completions: CompletionLog = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(COMPLETIONS_KEY))
            .unwrap_or_default();
        let mut completions = CompletionLog::new();
        for habit in &habits {
            let by_day = match &self.backend {
                Some(backend) => match backend.fetch_completions(&habit.id) {
                    Ok(rows) => rows
                        .into_iter()
                        .map(|row| (row.date, row.count))
                        .collect::<BTreeMap<_, _>>(),
                    Err(err) => {
                        tracing::warn!(habit = %habit.id, %err, "using cached completions");
                        cached_completions.get(&habit.id).cloned().unwrap_or_default()
                    }
                },
                None => cached_completions.get(&habit.id).cloned().unwrap_or_default(),
            };
            completions.insert(habit.id.clone(), by_day);
        }

        let snapshot = Snapshot {
            habits,
            groups,
            todos,
            completions,
        };
        *self.state.write() = snapshot.clone();
        self.store_all(&snapshot);
        snapshot
    }

    /// Cloned immutable snapshot for the presentation layer.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().clone()
    }

    /// Bumps the (habit, day) counter locally, mirrors the cache, and fires
    /// the backend call. A failing backend only produces a log line; the
    /// local state is already updated.
    pub fn increment(&self, habit_id: &str, date: NaiveDate) {
        let key = day_key(date);
        {
            let mut state = self.state.write();
            let by_day = state.completions.entry(habit_id.to_string()).or_default();
            *by_day.entry(key.clone()).or_insert(0) += 1;
        }
        self.store_completions();
        if let Some(backend) = &self.backend {
            if let Err(err) = backend.record_completion(habit_id, &key) {
                tracing::warn!(habit = habit_id, day = %key, %err, "completion not recorded remotely");
            }
        }
    }

    /// Drops the day's counter for a habit, locally and remotely.
    pub fn reset_day(&self, habit_id: &str, date: NaiveDate) {
        let key = day_key(date);
        {
            let mut state = self.state.write();
            if let Some(by_day) = state.completions.get_mut(habit_id) {
                by_day.remove(&key);
            }
        }
        self.store_completions();
        if let Some(backend) = &self.backend {
            if let Err(err) = backend.clear_completions(habit_id, &key) {
                tracing::warn!(habit = habit_id, day = %key, %err, "reset not recorded remotely");
            }
        }
    }

    /// Creates or updates a habit and returns its effective id. New habits
    /// get the server-assigned id when the backend answers, otherwise a
    /// client-generated one.
    pub fn save_habit(&self, mut payload: Habit) -> HabitId {
        let is_update = !payload.id.is_empty();
        if is_update {
            if let Some(backend) = &self.backend {
                if let Err(err) = backend.save_habit(&payload) {
                    tracing::warn!(habit = %payload.id, %err, "habit update not persisted remotely");
                }
            }
            let mut state = self.state.write();
            if let Some(existing) = state.habits.iter_mut().find(|h| h.id == payload.id) {
                *existing = payload.clone();
            } else {
                state.habits.insert(0, payload.clone());
            }
        } else {
            let remote_id = match &self.backend {
                Some(backend) => match backend.save_habit(&payload) {
                    Ok(id) => id,
                    Err(err) => {
                        tracing::warn!(habit = %payload.name, %err, "habit create not persisted remotely");
                        None
                    }
                },
                None => None,
            };
            payload.id = remote_id.unwrap_or_else(client_id);
            self.state.write().habits.insert(0, payload.clone());
        }
        self.store_lists();
        payload.id
    }

    pub fn delete_habit(&self, habit_id: &str) {
        if let Some(backend) = &self.backend {
            if let Err(err) = backend.delete_habit(habit_id) {
                tracing::warn!(habit = habit_id, %err, "habit delete not persisted remotely");
            }
        }
        {
            let mut state = self.state.write();
            state.habits.retain(|h| h.id != habit_id);
            state.completions.remove(habit_id);
        }
        self.store_lists();
        self.store_completions();
    }

    /// Creates or updates a to-do item; returns its effective id.
    pub fn save_todo(&self, mut payload: Todo) -> String {
        let is_update = !payload.id.is_empty();
        if !is_update {
            let remote_id = match &self.backend {
                Some(backend) => match backend.save_todo(&payload) {
                    Ok(id) => id,
                    Err(err) => {
                        tracing::warn!(todo = %payload.name, %err, "todo create not persisted remotely");
                        None
                    }
                },
                None => None,
            };
            payload.id = remote_id.unwrap_or_else(client_id);
            self.state.write().todos.insert(0, payload.clone());
        } else {
            if let Some(backend) = &self.backend {
                if let Err(err) = backend.save_todo(&payload) {
                    tracing::warn!(todo = %payload.id, %err, "todo update not persisted remotely");
                }
            }
            let mut state = self.state.write();
            if let Some(existing) = state.todos.iter_mut().find(|t| t.id == payload.id) {
                *existing = payload.clone();
            } else {
                state.todos.insert(0, payload.clone());
            }
        }
        self.store_lists();
        payload.id
    }

    pub fn toggle_todo(&self, todo_id: &str) {
        let toggled = {
            let mut state = self.state.write();
            match state.todos.iter_mut().find(|t| t.id == todo_id) {
                Some(todo) => {
                    todo.done = !todo.done;
                    Some(todo.clone())
                }
                None => None,
            }
        };
        let Some(todo) = toggled else {
            return;
        };
        if let Some(backend) = &self.backend {
            if let Err(err) = backend.save_todo(&todo) {
                tracing::warn!(todo = todo_id, %err, "todo toggle not persisted remotely");
            }
        }
        self.store_lists();
    }

    pub fn delete_todo(&self, todo_id: &str) {
        if let Some(backend) = &self.backend {
            if let Err(err) = backend.delete_todo(todo_id) {
                tracing::warn!(todo = todo_id, %err, "todo delete not persisted remotely");
            }
        }
        self.state.write().todos.retain(|t| t.id != todo_id);
        self.store_lists();
    }

    /// Achieved/target pair for the habit's current period. Unknown ids
    /// degrade to zero progress against a target of one.
    pub fn progress(&self, habit_id: &str, date: NaiveDate) -> Progress {
        let state = self.state.read();
        match state.habits.iter().find(|h| h.id == habit_id) {
            Some(habit) => Progress {
                achieved: period_count(habit, date, &state.completions),
                target: limit_for(habit),
            },
            None => Progress {
                achieved: 0,
                target: 1,
            },
        }
    }

    /// Signed streak for the habit; unknown ids yield zero.
    pub fn streak(&self, habit_id: &str, date: NaiveDate) -> i32 {
        let state = self.state.read();
        state
            .habits
            .iter()
            .find(|h| h.id == habit_id)
            .map(|habit| calculate_streak(habit, &state.completions, date))
            .unwrap_or(0)
    }

    /// Per-habit done flag including linked-cluster evaluation.
    pub fn is_done(&self, habit_id: &str, date: NaiveDate) -> bool {
        let state = self.state.read();
        state
            .habits
            .iter()
            .find(|h| h.id == habit_id)
            .map(|habit| is_habit_done(habit, &state.habits, date, &state.completions))
            .unwrap_or(false)
    }

    /// Merges an exported backup into the local state. Habits are matched
    /// by name within the same group; matches adopt the imported goal and
    /// day counters (imported values win on duplicate days), everything
    /// else is created, along with any group named but not yet known.
    /// Import is a local operation; the backend is not consulted.
    pub fn merge_import(&self, payload: ImportPayload) -> ImportSummary {
        let mut summary = ImportSummary::default();
        {
            let mut guard = self.state.write();
            let state = &mut *guard;
            for imported in payload.habits {
                let group_id = resolve_import_group(&mut state.groups, imported.group.as_deref());
                let logs: Vec<(DateKey, u32)> = imported
                    .logs
                    .iter()
                    .filter_map(|log| {
                        let raw = log.date.as_deref()?;
                        let key = DateKey::parse(raw.get(..10).unwrap_or(raw))?;
                        Some((key, log.value.unwrap_or(1)))
                    })
                    .collect();

                let existing = state
                    .habits
                    .iter_mut()
                    .find(|h| h.name == imported.name && h.group_id == group_id);
                match existing {
                    Some(habit) => {
                        if let Some(goal) = imported.goal {
                            apply_import_goal(habit, goal);
                        }
                        let by_day = state.completions.entry(habit.id.clone()).or_default();
                        for (key, count) in logs {
                            by_day.insert(key, count);
                        }
                        summary.merged += 1;
                    }
                    None => {
                        let mut habit = Habit {
                            id: client_id(),
                            name: imported.name.clone(),
                            group_id,
                            group_name: imported.group.clone(),
                            ..Habit::default()
                        };
                        apply_import_goal(&mut habit, imported.goal.unwrap_or(1));
                        let by_day = state.completions.entry(habit.id.clone()).or_default();
                        for (key, count) in logs {
                            by_day.insert(key, count);
                        }
                        state.habits.push(habit);
                        summary.added += 1;
                    }
                }
            }
        }
        self.store_lists();
        self.store_completions();
        summary
    }

    fn fetch_or_cached<T>(
        &self,
        what: &str,
        key: &str,
        fetch: impl FnOnce(&dyn HabitBackend) -> Result<Vec<T>>,
    ) -> Vec<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if let Some(backend) = &self.backend {
            match fetch(backend.as_ref()) {
                Ok(items) => return items,
                Err(err) => {
                    tracing::warn!(what, %err, "falling back to cached copy");
                }
            }
        }
        self.cache
            .as_ref()
            .and_then(|cache| cache.get(key))
            .unwrap_or_default()
    }

    fn store_all(&self, snapshot: &Snapshot) {
        let Some(cache) = &self.cache else {
            return;
        };
        cache.set(HABITS_KEY, &snapshot.habits);
        cache.set(GROUPS_KEY, &snapshot.groups);
        cache.set(TODOS_KEY, &snapshot.todos);
        cache.set(COMPLETIONS_KEY, &snapshot.completions);
    }

    fn store_lists(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let state = self.state.read();
        cache.set(HABITS_KEY, &state.habits);
        cache.set(GROUPS_KEY, &state.groups);
        cache.set(TODOS_KEY, &state.todos);
    }

    fn store_completions(&self) {
        if let Some(cache) = &self.cache {
            cache.set(COMPLETIONS_KEY, &self.state.read().completions);
        }
    }
}

/// Legacy payloads carry a group display name instead of an id; resolve it
/// against the loaded group list once per refresh.
fn reconcile_group_ids(habits: &mut [Habit], groups: &[Group]) {
    for habit in habits {
        if habit.group_id.is_some() {
            continue;
        }
        if let Some(name) = &habit.group_name {
            if let Some(group) = groups.iter().find(|g| &g.name == name) {
                habit.group_id = Some(group.id.clone());
            }
        }
    }
}

/// Looks the named group up by display name, creating it when unknown.
fn resolve_import_group(groups: &mut Vec<Group>, name: Option<&str>) -> Option<String> {
    let name = name?;
    if let Some(group) = groups.iter().find(|g| g.name == name) {
        return Some(group.id.clone());
    }
    let group = Group {
        id: client_id(),
        name: name.to_string(),
        ..Group::default()
    };
    let id = group.id.clone();
    groups.push(group);
    Some(id)
}

/// Export files encode recurrence as a bare goal number: one means a plain
/// daily habit, anything higher a weekly target.
fn apply_import_goal(habit: &mut Habit, goal: u32) {
    if goal <= 1 {
        habit.frequency = Frequency::Daily;
        habit.times_per_week = None;
    } else {
        habit.frequency = Frequency::PerWeek;
        habit.times_per_week = Some(goal);
    }
}

fn client_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    format!("local-{nanos}")
}
