use reedline::{Completer, Span, Suggestion};
use std::sync::{Arc, Mutex, PoisonError};
use student_admissions::commands::COMMAND_WORDS;

const SUBCOMMANDS: &[(&str, &[&str])] = &[
    ("filter", &["add", "list", "rm", "edit", "clear", "mode"]),
    ("preset", &["save", "load", "list", "rm"]),
    ("archive", &["list", "prune", "open"]),
    ("export", &["all", "tab", "filtered"]),
    ("view", &["all", "highlighted", "unhighlighted"]),
    ("filtered", &["matches", "unmatched"]),
    ("search", &["clear"]),
];

/// Column names of the current tab, updated by the shell after every command
pub type SharedColumns = Arc<Mutex<Vec<String>>>;

pub struct CommandCompleter {
    columns: SharedColumns,
}

impl CommandCompleter {
    pub fn new(columns: SharedColumns) -> Self {
        Self { columns }
    }

    fn candidates(&self, words: &[&str]) -> Vec<(String, &'static str)> {
        match words {
            [] => COMMAND_WORDS.iter().map(|w| (w.to_string(), "command")).collect(),
            [command] => SUBCOMMANDS
                .iter()
                .find(|(name, _)| name == command)
                .map(|(_, subs)| subs.iter().map(|s| (s.to_string(), "subcommand")).collect())
                .unwrap_or_else(|| self.column_candidates()),
            _ => self.column_candidates(),
        }
    }

    fn column_candidates(&self) -> Vec<(String, &'static str)> {
        let columns = self.columns.lock().unwrap_or_else(PoisonError::into_inner);
        columns
            .iter()
            .map(|c| {
                let value = if c.contains(' ') {
                    format!("\"{}\"", c)
                } else {
                    c.clone()
                };
                (value, "column")
            })
            .collect()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        let input = &line[..pos];
        let partial = if input.ends_with(char::is_whitespace) {
            ""
        } else {
            input.split_whitespace().last().unwrap_or("")
        };
        let words: Vec<&str> = input[..input.len() - partial.len()].split_whitespace().collect();
        let needle = partial.trim_start_matches('"').to_lowercase();

        self.candidates(&words)
            .into_iter()
            .filter(|(value, _)| value.trim_start_matches('"').to_lowercase().starts_with(&needle))
            .map(|(value, description)| Suggestion {
                value,
                description: Some(description.to_string()),
                extra: None,
                span: Span {
                    start: pos - partial.len(),
                    end: pos,
                },
                style: None,
                append_whitespace: true,
            })
            .collect()
    }
}
