//! Game event aggregation.
//!
//! Keeps a time-ordered event history per (game, user) and folds it into a
//! summary on demand. Events may arrive out of order; each one is placed
//! after every already-stored event with the same or an earlier time.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

use parking_lot::Mutex;

use crate::error::SummaryError;
use crate::events::decode_report_body;

/// Ordered `key -> value` updates carried by one event.
pub type Updates = BTreeMap<String, String>;

/// A single reported game event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameEvent {
    pub time: i64,
    pub name: String,
    pub description: String,
    pub team_a: String,
    pub team_b: String,
    pub general_updates: Updates,
    pub team_a_updates: Updates,
    pub team_b_updates: Updates,
}

impl GameEvent {
    pub fn new(
        team_a: impl Into<String>,
        team_b: impl Into<String>,
        name: impl Into<String>,
        time: i64,
    ) -> Self {
        Self {
            time,
            name: name.into(),
            team_a: team_a.into(),
            team_b: team_b.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_general_update(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.general_updates.insert(key.into(), value.into());
        self
    }

    pub fn with_team_a_update(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.team_a_updates.insert(key.into(), value.into());
        self
    }

    pub fn with_team_b_update(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.team_b_updates.insert(key.into(), value.into());
        self
    }
}

/// Events from one user about one game, ascending by time.
#[derive(Debug, Clone, Default)]
pub struct GameHistory {
    events: Vec<GameEvent>,
}

impl GameHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the upper bound of `event.time`. Returns the index used.
    pub fn insert(&mut self, event: GameEvent) -> usize {
        let pos = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(pos, event);
        pos
    }

    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Fold the history into a summary. Later events win on key collision.
    pub fn summarize(&self) -> Option<GameSummary> {
        let first = self.events.first()?;
        let mut summary = GameSummary {
            team_a: first.team_a.clone(),
            team_b: first.team_b.clone(),
            ..GameSummary::default()
        };

        for event in &self.events {
            merge(&mut summary.general_stats, &event.general_updates);
            merge(&mut summary.team_a_stats, &event.team_a_updates);
            merge(&mut summary.team_b_stats, &event.team_b_updates);
            summary.reports.push(EventReport {
                time: event.time,
                name: event.name.clone(),
                description: event.description.clone(),
            });
        }

        Some(summary)
    }
}

fn merge(into: &mut Updates, from: &Updates) {
    for (key, value) in from {
        into.insert(key.clone(), value.clone());
    }
}

/// One line of the chronological report list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub time: i64,
    pub name: String,
    pub description: String,
}

/// Flattened view over a game history.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameSummary {
    pub team_a: String,
    pub team_b: String,
    pub general_stats: Updates,
    pub team_a_stats: Updates,
    pub team_b_stats: Updates,
    pub reports: Vec<EventReport>,
}

impl GameSummary {
    /// Render the summary file contents.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} vs {}", self.team_a, self.team_b);

        write_stats(&mut out, "General stats:", &self.general_stats);
        write_stats(&mut out, &format!("{} stats:", self.team_a), &self.team_a_stats);
        write_stats(&mut out, &format!("{} stats:", self.team_b), &self.team_b_stats);

        out.push_str("Game event reports:\n");
        for report in &self.reports {
            let _ = write!(
                out,
                "{} - {}:\n\n{}\n\n",
                report.time, report.name, report.description
            );
        }
        out
    }
}

fn write_stats(out: &mut String, title: &str, stats: &Updates) {
    out.push_str(title);
    out.push('\n');
    for (key, value) in stats {
        let _ = writeln!(out, "{}: {}", key, value);
    }
}

/// Key of one history: the game (topic) and the reporting user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub game: String,
    pub user: String,
}

impl HistoryKey {
    pub fn new(game: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            user: user.into(),
        }
    }
}

/// Aggregator shared by the command loop and the server read loop.
///
/// A single lock guards the whole keyed structure.
#[derive(Debug, Default)]
pub struct GameAggregator {
    histories: Mutex<HashMap<HistoryKey, GameHistory>>,
}

impl GameAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a report body and store it. Malformed bodies are logged and
    /// dropped; returns whether the event was stored.
    pub fn record(&self, game: &str, user: &str, body: &str) -> bool {
        match decode_report_body(body) {
            Ok(report) => {
                self.insert(game, user, report.event);
                true
            }
            Err(e) => {
                log::warn!("dropping report for {} from {}: {}", game, user, e);
                false
            }
        }
    }

    /// Store an already-parsed event.
    pub fn insert(&self, game: &str, user: &str, event: GameEvent) {
        let mut histories = self.histories.lock();
        let history = histories.entry(HistoryKey::new(game, user)).or_default();
        let pos = history.insert(event);
        log::debug!(
            "recorded event #{} of {} for {} from {}",
            pos,
            history.len(),
            game,
            user
        );
    }

    /// Summary for (game, user), or `None` when nothing was recorded.
    pub fn summarize(&self, game: &str, user: &str) -> Option<GameSummary> {
        self.histories
            .lock()
            .get(&HistoryKey::new(game, user))
            .and_then(GameHistory::summarize)
    }

    /// Snapshot of the stored events for (game, user).
    pub fn events(&self, game: &str, user: &str) -> Vec<GameEvent> {
        self.histories
            .lock()
            .get(&HistoryKey::new(game, user))
            .map(|h| h.events().to_vec())
            .unwrap_or_default()
    }

    /// Write the rendered summary to `path`. The lock is released before
    /// touching the filesystem.
    pub fn write_summary(&self, game: &str, user: &str, path: &Path) -> Result<(), SummaryError> {
        let summary = self
            .summarize(game, user)
            .ok_or_else(|| SummaryError::NoData {
                game: game.to_string(),
                user: user.to_string(),
            })?;

        std::fs::write(path, summary.render()).map_err(|source| SummaryError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
