//! Event files and report bodies.
//!
//! `report` reads a JSON events file:
//!
//! ```json
//! {
//!   "team a": "Germany",
//!   "team b": "Japan",
//!   "events": [
//!     {
//!       "event name": "kickoff",
//!       "time": 0,
//!       "general game updates": { "active": true },
//!       "team a updates": { "goals": "0" },
//!       "team b updates": {},
//!       "description": "The game has started."
//!     }
//!   ]
//! }
//! ```
//!
//! Each event is then sent as a labeled text body, which is also the format
//! the aggregator parses out of MESSAGE frames.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Deserialize;

use crate::error::{BodyParseError, EventFileError};
use crate::state::game::{GameEvent, Updates};

const GENERAL_UPDATES_LABEL: &str = "general game updates:";
const TEAM_A_UPDATES_LABEL: &str = "team a updates:";
const TEAM_B_UPDATES_LABEL: &str = "team b updates:";
const DESCRIPTION_PREFIX: &str = "description:";

#[derive(Debug, Deserialize)]
struct EventsFile {
    #[serde(rename = "team a")]
    team_a: String,
    #[serde(rename = "team b")]
    team_b: String,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "event name")]
    name: String,
    time: i64,
    #[serde(rename = "general game updates", default)]
    general_updates: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "team a updates", default)]
    team_a_updates: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "team b updates", default)]
    team_b_updates: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    description: String,
}

/// Parsed contents of an events file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameReport {
    pub team_a: String,
    pub team_b: String,
    /// Events in file order.
    pub events: Vec<GameEvent>,
}

impl GameReport {
    /// Topic the events are published to: `<teamA>_<teamB>`.
    pub fn topic(&self) -> String {
        format!("{}_{}", self.team_a, self.team_b)
    }
}

/// Load and parse an events file.
pub fn parse_events_file(path: &Path) -> Result<GameReport, EventFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| EventFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_events_json(&text).map_err(|source| EventFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse events-file JSON text.
pub fn parse_events_json(text: &str) -> Result<GameReport, serde_json::Error> {
    let file: EventsFile = serde_json::from_str(text)?;
    let events = file
        .events
        .into_iter()
        .map(|raw| GameEvent {
            time: raw.time,
            name: raw.name,
            description: raw.description,
            team_a: file.team_a.clone(),
            team_b: file.team_b.clone(),
            general_updates: stringify(raw.general_updates),
            team_a_updates: stringify(raw.team_a_updates),
            team_b_updates: stringify(raw.team_b_updates),
        })
        .collect();

    Ok(GameReport {
        team_a: file.team_a,
        team_b: file.team_b,
        events,
    })
}

fn stringify(values: BTreeMap<String, serde_json::Value>) -> Updates {
    values
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}

/// Render the labeled body sent for one event.
pub fn encode_report_body(user: &str, event: &GameEvent) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "user:{}", user);
    let _ = writeln!(body, "team a:{}", event.team_a);
    let _ = writeln!(body, "team b:{}", event.team_b);
    let _ = writeln!(body, "event name:{}", event.name);
    let _ = writeln!(body, "time:{}", event.time);

    body.push_str(GENERAL_UPDATES_LABEL);
    body.push('\n');
    for (key, value) in &event.general_updates {
        let _ = writeln!(body, "{}:{}", key, value);
    }

    body.push_str(TEAM_A_UPDATES_LABEL);
    body.push('\n');
    for (key, value) in &event.team_a_updates {
        let _ = writeln!(body, "\t{}:{}", key, value);
    }

    body.push_str(TEAM_B_UPDATES_LABEL);
    body.push('\n');
    for (key, value) in &event.team_b_updates {
        let _ = writeln!(body, "\t{}:{}", key, value);
    }

    let _ = writeln!(body, "{}{}", DESCRIPTION_PREFIX, event.description);
    body
}

/// A decoded report body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportBody {
    /// The `user:` line, if the body carried one.
    pub user: Option<String>,
    pub event: GameEvent,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Fields,
    General,
    TeamA,
    TeamB,
}

/// Parse a labeled report body.
///
/// Update lines may be indented. Everything after the unindented
/// `description:` line that closes the body (including following lines) is
/// the description.
pub fn decode_report_body(body: &str) -> Result<ReportBody, BodyParseError> {
    let mut user = None;
    let mut team_a = None;
    let mut team_b = None;
    let mut name = None;
    let mut time = None;
    let mut event = GameEvent::default();
    let mut section = Section::Fields;

    let mut lines = body.lines().enumerate();
    while let Some((idx, raw)) = lines.next() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            GENERAL_UPDATES_LABEL => {
                section = Section::General;
                continue;
            }
            TEAM_A_UPDATES_LABEL => {
                section = Section::TeamA;
                continue;
            }
            TEAM_B_UPDATES_LABEL => {
                section = Section::TeamB;
                continue;
            }
            _ => {}
        }

        // Update blocks may carry a `description` key of their own; team b
        // updates are indented, the trailing description line is not
        let opens_description = match section {
            Section::Fields => true,
            Section::TeamB => !raw.starts_with([' ', '\t']),
            Section::General | Section::TeamA => false,
        };
        if let Some(first) = line
            .strip_prefix(DESCRIPTION_PREFIX)
            .filter(|_| opens_description)
        {
            let mut description = first.trim_start().to_string();
            for (_, rest) in lines.by_ref() {
                description.push('\n');
                description.push_str(rest);
            }
            event.description = description.trim_end().to_string();
            break;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(BodyParseError::MalformedUpdate {
                line: idx + 1,
                text: line.to_string(),
            });
        };
        let (key, value) = (key.trim(), value.trim());

        match section {
            Section::Fields => match key {
                "user" => user = Some(value.to_string()),
                "team a" => team_a = Some(value.to_string()),
                "team b" => team_b = Some(value.to_string()),
                "event name" => name = Some(value.to_string()),
                "time" => time = Some(value.to_string()),
                other => log::debug!("ignoring unknown report field `{}`", other),
            },
            Section::General => {
                event.general_updates.insert(key.to_string(), value.to_string());
            }
            Section::TeamA => {
                event.team_a_updates.insert(key.to_string(), value.to_string());
            }
            Section::TeamB => {
                event.team_b_updates.insert(key.to_string(), value.to_string());
            }
        }
    }

    event.team_a = team_a.ok_or(BodyParseError::MissingField("team a"))?;
    event.team_b = team_b.ok_or(BodyParseError::MissingField("team b"))?;
    event.name = name.ok_or(BodyParseError::MissingField("event name"))?;
    let time = time.ok_or(BodyParseError::MissingField("time"))?;
    event.time = time
        .parse()
        .map_err(|_| BodyParseError::InvalidTime(time.clone()))?;

    Ok(ReportBody { user, event })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "team a": "Germany",
        "team b": "Japan",
        "events": [
            {
                "event name": "kickoff",
                "time": 0,
                "general game updates": { "active": true, "before halftime": "true" },
                "team a updates": { "goals": "0", "possession": 51 },
                "team b updates": {},
                "description": "And we're off!"
            },
            {
                "event name": "goal!!!!",
                "time": 1980,
                "team a updates": { "goals": "1" },
                "description": "Gundogan converts the penalty."
            }
        ]
    }"#;

    #[test]
    fn test_parse_events_json() {
        let report = parse_events_json(SAMPLE).unwrap();
        assert_eq!(report.team_a, "Germany");
        assert_eq!(report.team_b, "Japan");
        assert_eq!(report.topic(), "Germany_Japan");
        assert_eq!(report.events.len(), 2);

        let kickoff = &report.events[0];
        assert_eq!(kickoff.name, "kickoff");
        assert_eq!(kickoff.team_a, "Germany");
        assert_eq!(kickoff.general_updates["active"], "true");
        assert_eq!(kickoff.team_a_updates["possession"], "51");
        assert!(kickoff.team_b_updates.is_empty());

        let goal = &report.events[1];
        assert_eq!(goal.time, 1980);
        assert!(goal.general_updates.is_empty());
    }

    #[test]
    fn test_parse_events_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            parse_events_file(&missing),
            Err(EventFileError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ \"team a\": ").unwrap();
        assert!(matches!(
            parse_events_file(&broken),
            Err(EventFileError::Json { .. })
        ));
    }

    #[test]
    fn test_encode_report_body_layout() {
        let event = GameEvent::new("Germany", "Japan", "kickoff", 0)
            .with_general_update("active", "true")
            .with_team_a_update("goals", "0")
            .with_team_b_update("goals", "0")
            .with_description("And we're off!");

        assert_eq!(
            encode_report_body("alice", &event),
            "user:alice\n\
             team a:Germany\n\
             team b:Japan\n\
             event name:kickoff\n\
             time:0\n\
             general game updates:\n\
             active:true\n\
             team a updates:\n\
             \tgoals:0\n\
             team b updates:\n\
             \tgoals:0\n\
             description:And we're off!\n"
        );
    }

    #[test]
    fn test_decode_report_body() {
        let event = GameEvent::new("Germany", "Japan", "goal!!!!", 1980)
            .with_team_a_update("goals", "1")
            .with_general_update("score", "1:0")
            .with_description("Penalty.\nSecond line.");
        let body = encode_report_body("bob", &event);

        let decoded = decode_report_body(&body).unwrap();
        assert_eq!(decoded.user.as_deref(), Some("bob"));
        assert_eq!(decoded.event, event);
    }

    #[test]
    fn test_decode_update_keyed_description() {
        let event = GameEvent::new("Germany", "Japan", "var check", 2100)
            .with_general_update("description", "under review")
            .with_general_update("score", "1:0")
            .with_team_a_update("description", "appeal")
            .with_team_a_update("shots", "4")
            .with_team_b_update("description", "protest")
            .with_team_b_update("shots", "2")
            .with_description("Goal stands.");
        let body = encode_report_body("dana", &event);

        let decoded = decode_report_body(&body).unwrap();
        assert_eq!(decoded.event, event);
    }

    #[test]
    fn test_decode_tolerates_crlf_and_trailing_nul_free_body() {
        let body = "user:carol\r\nteam a:A\r\nteam b:B\r\nevent name:half\r\ntime:45\r\n\
                    general game updates:\r\nteam a updates:\r\n\tshots:3\r\n\
                    team b updates:\r\ndescription:Break\r\n";
        let decoded = decode_report_body(body).unwrap();
        assert_eq!(decoded.event.time, 45);
        assert_eq!(decoded.event.team_a_updates["shots"], "3");
        assert_eq!(decoded.event.description, "Break");
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode_report_body("team b:B\nevent name:x\ntime:1\n"),
            Err(BodyParseError::MissingField("team a"))
        );
        assert_eq!(
            decode_report_body("team a:A\nteam b:B\nevent name:x\ntime:soon\n"),
            Err(BodyParseError::InvalidTime("soon".into()))
        );
        assert_eq!(
            decode_report_body("team a:A\ngeneral game updates:\nno colon here\n"),
            Err(BodyParseError::MalformedUpdate {
                line: 3,
                text: "no colon here".into(),
            })
        );
    }
}
