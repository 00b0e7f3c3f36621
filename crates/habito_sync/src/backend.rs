use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use parking_lot::RwLock;

use habito_domain::model::{DateKey, Group, Habit, HabitId, Todo};
use habito_domain::service::{CompletionRow, HabitBackend};

/// In-process implementation of the persistence collaborator. Serves as the
/// offline backend and as the test double for the sync layer.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    habits: Vec<Habit>,
    groups: Vec<Group>,
    todos: Vec<Todo>,
    completions: HashMap<String, BTreeMap<DateKey, u32>>,
    next_id: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_group(&self, group: Group) {
        self.state.write().groups.push(group);
    }

    fn assign_id(state: &mut MemoryState) -> String {
        state.next_id += 1;
        state.next_id.to_string()
    }
}

impl HabitBackend for MemoryBackend {
    fn fetch_habits(&self) -> Result<Vec<Habit>> {
        Ok(self.state.read().habits.clone())
    }

    fn fetch_groups(&self) -> Result<Vec<Group>> {
        Ok(self.state.read().groups.clone())
    }

    fn fetch_todos(&self) -> Result<Vec<Todo>> {
        Ok(self.state.read().todos.clone())
    }

    fn fetch_completions(&self, habit_id: &str) -> Result<Vec<CompletionRow>> {
        let state = self.state.read();
        let rows = state
            .completions
            .get(habit_id)
            .map(|by_day| {
                by_day
                    .iter()
                    .map(|(date, count)| CompletionRow {
                        date: date.clone(),
                        count: *count,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    fn record_completion(&self, habit_id: &str, date: &DateKey) -> Result<()> {
        let mut state = self.state.write();
        let by_day = state.completions.entry(habit_id.to_string()).or_default();
        *by_day.entry(date.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn clear_completions(&self, habit_id: &str, date: &DateKey) -> Result<()> {
        let mut state = self.state.write();
        if let Some(by_day) = state.completions.get_mut(habit_id) {
            by_day.remove(date);
        }
        Ok(())
    }

    fn save_habit(&self, habit: &Habit) -> Result<Option<HabitId>> {
        let mut state = self.state.write();
        if habit.id.is_empty() {
            let id = Self::assign_id(&mut state);
            let mut created = habit.clone();
            created.id = id.clone();
            state.habits.push(created);
            return Ok(Some(id));
        }
        match state.habits.iter_mut().find(|h| h.id == habit.id) {
            Some(existing) => {
                *existing = habit.clone();
                Ok(None)
            }
            None => Err(anyhow!("unknown habit `{}`", habit.id)),
        }
    }

    fn delete_habit(&self, habit_id: &str) -> Result<()> {
        let mut state = self.state.write();
        state.habits.retain(|h| h.id != habit_id);
        state.completions.remove(habit_id);
        Ok(())
    }

    fn save_todo(&self, todo: &Todo) -> Result<Option<String>> {
        let mut state = self.state.write();
        if todo.id.is_empty() {
            let id = Self::assign_id(&mut state);
            let mut created = todo.clone();
            created.id = id.clone();
            state.todos.push(created);
            return Ok(Some(id));
        }
        match state.todos.iter_mut().find(|t| t.id == todo.id) {
            Some(existing) => {
                *existing = todo.clone();
                Ok(None)
            }
            None => Err(anyhow!("unknown todo `{}`", todo.id)),
        }
    }

    fn delete_todo(&self, todo_id: &str) -> Result<()> {
        self.state.write().todos.retain(|t| t.id != todo_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_habits_receive_sequential_ids() {
        let backend = MemoryBackend::new();
        let first = backend
            .save_habit(&Habit {
                name: "Run".into(),
                ..Habit::default()
            })
            .unwrap();
        let second = backend
            .save_habit(&Habit {
                name: "Read".into(),
                ..Habit::default()
            })
            .unwrap();
        assert_eq!(first.as_deref(), Some("1"));
        assert_eq!(second.as_deref(), Some("2"));
    }

    #[test]
    fn completion_counters_accumulate_and_clear() {
        let backend = MemoryBackend::new();
        let key = DateKey::parse("2025-11-20").unwrap();
        backend.record_completion("7", &key).unwrap();
        backend.record_completion("7", &key).unwrap();

        let rows = backend.fetch_completions("7").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 2);

        backend.clear_completions("7", &key).unwrap();
        assert!(backend.fetch_completions("7").unwrap().is_empty());
    }

    #[test]
    fn updating_an_unknown_habit_is_an_error() {
        let backend = MemoryBackend::new();
        let err = backend
            .save_habit(&Habit {
                id: "404".into(),
                name: "Ghost".into(),
                ..Habit::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("unknown habit"));
    }
}
