//! Shell command grammar.
//!
//! Tab, rule, row and archive numbers are typed 1-based, as listed by the
//! shell, and stored 0-based.

use crate::data::archive::ArchivePeriod;
use crate::data::data_view::HighlightFilter;
use crate::filter::error::FilterError;
use crate::filter::manager::CombinationMode;
use crate::filter::parser::parse_rule;
use crate::filter::rule::FilterRule;
use crate::workspace::io::{ExportScope, LoadAction};
use nom::{
    branch::alt,
    bytes::complete::{is_not, take_till1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, opt},
    multi::many0,
    sequence::{delimited, preceded, terminated},
    IResult,
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load {
        path: PathBuf,
        sheet: Option<String>,
        action: Option<LoadAction>,
    },
    Tabs,
    Tab(usize),
    Show(Option<usize>),
    Columns(Option<String>),
    Stats(String),
    Sort {
        column: String,
        ascending: bool,
    },
    FilterAdd {
        rule: FilterRule,
        mode: Option<CombinationMode>,
    },
    FilterList,
    FilterRemove(usize),
    FilterEdit {
        index: usize,
        rule: FilterRule,
    },
    FilterClear(Option<String>),
    FilterMode(CombinationMode),
    Search {
        text: String,
        column: Option<String>,
    },
    SearchClear,
    View(HighlightFilter),
    NewTab(String),
    Duplicate,
    Close(Option<usize>),
    Rename(String),
    /// true shows matching rows in the Filtered tab
    FilteredMode(bool),
    Edit {
        row: usize,
        column: String,
        value: String,
    },
    MoveHighlighted,
    CopyHighlighted,
    Export {
        scope: ExportScope,
        path: PathBuf,
    },
    Save(PathBuf),
    PresetSave {
        name: String,
        description: String,
    },
    PresetLoad(String),
    PresetList,
    PresetRemove(String),
    ArchiveList(ArchivePeriod),
    ArchivePrune(PruneRule),
    ArchiveOpen(usize),
    Logs(Option<usize>),
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneRule {
    OlderThanDays(i64),
    KeepLatest(usize),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a positive number")]
    InvalidNumber(String),

    #[error("unbalanced quotes")]
    UnbalancedQuotes,

    #[error(transparent)]
    Rule(#[from] FilterError),

    #[error("{0}")]
    Invalid(String),
}

type CommandResult<T> = Result<T, CommandError>;

fn quoted(input: &str) -> IResult<&str, String> {
    map(delimited(char('"'), opt(is_not("\"")), char('"')), |s: Option<&str>| {
        s.unwrap_or_default().to_string()
    })(input)
}

fn bare(input: &str) -> IResult<&str, String> {
    map(
        take_till1(|c: char| c.is_whitespace() || c == '"'),
        str::to_string,
    )(input)
}

/// Split on whitespace, keeping double-quoted runs together
pub fn tokenize(input: &str) -> CommandResult<Vec<String>> {
    all_consuming(terminated(
        many0(preceded(multispace0, alt((quoted, bare)))),
        multispace0,
    ))(input)
    .map(|(_, tokens)| tokens)
    .map_err(|_| CommandError::UnbalancedQuotes)
}

/// First whitespace-separated word and the trimmed rest
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.find(char::is_whitespace) {
        Some(pos) => (&input[..pos], input[pos..].trim()),
        None => (input, ""),
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// 1-based user number to a 0-based index
fn ordinal(value: &str) -> CommandResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(CommandError::InvalidNumber(value.to_string())),
    }
}

fn count(value: &str) -> CommandResult<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| CommandError::InvalidNumber(value.to_string()))
}

fn optional_count(rest: &str) -> CommandResult<Option<usize>> {
    if rest.is_empty() {
        Ok(None)
    } else {
        count(rest).map(Some)
    }
}

fn required<'a>(rest: &'a str, usage: &'static str) -> CommandResult<&'a str> {
    if rest.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(rest)
    }
}

/// Strip a trailing `--any`/`--all` from a rule expression
fn split_mode_flag(expression: &str) -> (&str, Option<CombinationMode>) {
    let expression = expression.trim();
    for (flag, mode) in [("--any", CombinationMode::Any), ("--all", CombinationMode::All)] {
        if let Some(stripped) = expression.strip_suffix(flag) {
            return (stripped.trim_end(), Some(mode));
        }
    }
    (expression, None)
}

fn parse_load(rest: &str) -> CommandResult<Command> {
    const USAGE: &str = "load <path> [--sheet NAME] [--merge|--replace|--new-tab]";
    let tokens = tokenize(rest)?;
    let mut path = None;
    let mut sheet = None;
    let mut action = None;

    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        match token.as_str() {
            "--sheet" => sheet = Some(iter.next().ok_or(CommandError::Usage(USAGE))?),
            "--merge" | "--replace" | "--new-tab" => {
                action = Some(token.parse::<LoadAction>().map_err(CommandError::Invalid)?)
            }
            _ if path.is_none() => path = Some(PathBuf::from(token)),
            _ => return Err(CommandError::Usage(USAGE)),
        }
    }

    Ok(Command::Load {
        path: path.ok_or(CommandError::Usage(USAGE))?,
        sheet,
        action,
    })
}

fn parse_filter(rest: &str) -> CommandResult<Command> {
    const USAGE: &str = "filter add|list|rm|edit|clear|mode ...";
    let (sub, args) = split_word(rest);
    match sub {
        "add" => {
            let (expression, mode) = split_mode_flag(required(args, "filter add <expr> [--any]")?);
            Ok(Command::FilterAdd {
                rule: parse_rule(expression)?,
                mode,
            })
        }
        "" | "list" | "ls" => Ok(Command::FilterList),
        "rm" | "remove" => Ok(Command::FilterRemove(ordinal(required(args, "filter rm <n>")?)?)),
        "edit" => {
            let (number, expression) = split_word(args);
            if expression.is_empty() {
                return Err(CommandError::Usage("filter edit <n> <expr>"));
            }
            Ok(Command::FilterEdit {
                index: ordinal(number)?,
                rule: parse_rule(expression)?,
            })
        }
        "clear" => Ok(Command::FilterClear(
            (!args.is_empty()).then(|| unquote(args)),
        )),
        "mode" => {
            let mode = required(args, "filter mode all|any")?
                .parse::<CombinationMode>()
                .map_err(|_| CommandError::Usage("filter mode all|any"))?;
            Ok(Command::FilterMode(mode))
        }
        _ => Err(CommandError::Usage(USAGE)),
    }
}

fn parse_search(rest: &str) -> CommandResult<Command> {
    const USAGE: &str = "search <text> [--column NAME] | search clear";
    if rest == "clear" {
        return Ok(Command::SearchClear);
    }
    let (text, column) = match rest.find("--column") {
        Some(pos) => {
            let column = unquote(&rest[pos + "--column".len()..]);
            if column.is_empty() {
                return Err(CommandError::Usage(USAGE));
            }
            (unquote(&rest[..pos]), Some(column))
        }
        None => (unquote(rest), None),
    };
    if text.is_empty() {
        return Err(CommandError::Usage(USAGE));
    }
    Ok(Command::Search { text, column })
}

fn parse_edit(rest: &str) -> CommandResult<Command> {
    const USAGE: &str = "edit <row> <column> <value>";
    let tokens = tokenize(rest)?;
    if tokens.len() < 2 {
        return Err(CommandError::Usage(USAGE));
    }
    Ok(Command::Edit {
        row: ordinal(&tokens[0])?,
        column: tokens[1].clone(),
        value: tokens[2..].join(" "),
    })
}

fn parse_preset(rest: &str) -> CommandResult<Command> {
    const USAGE: &str = "preset save <name> [description] | load <name> | list | rm <name>";
    let (sub, args) = split_word(rest);
    match sub {
        "save" => {
            let tokens = tokenize(args)?;
            let (name, description) = tokens.split_first().ok_or(CommandError::Usage(USAGE))?;
            Ok(Command::PresetSave {
                name: name.clone(),
                description: description.join(" "),
            })
        }
        "load" => Ok(Command::PresetLoad(unquote(required(args, USAGE)?))),
        "" | "list" | "ls" => Ok(Command::PresetList),
        "rm" | "delete" => Ok(Command::PresetRemove(unquote(required(args, USAGE)?))),
        _ => Err(CommandError::Usage(USAGE)),
    }
}

fn parse_archive(rest: &str) -> CommandResult<Command> {
    const USAGE: &str = "archive list [today|week|month] | prune --days N | prune --keep N | open <n>";
    let (sub, args) = split_word(rest);
    match sub {
        "" | "list" | "ls" => {
            let period = match args {
                "" | "all" => ArchivePeriod::All,
                "today" => ArchivePeriod::Today,
                "week" => ArchivePeriod::Week,
                "month" => ArchivePeriod::Month,
                _ => return Err(CommandError::Usage(USAGE)),
            };
            Ok(Command::ArchiveList(period))
        }
        "prune" => {
            let (flag, value) = split_word(args);
            let rule = match flag {
                "--days" => PruneRule::OlderThanDays(count(value)? as i64),
                "--keep" => PruneRule::KeepLatest(count(value)?),
                _ => return Err(CommandError::Usage(USAGE)),
            };
            Ok(Command::ArchivePrune(rule))
        }
        "open" => Ok(Command::ArchiveOpen(ordinal(required(args, USAGE)?)?)),
        _ => Err(CommandError::Usage(USAGE)),
    }
}

/// Parse one shell line; `Ok(None)` for blank lines and comments
pub fn parse_command(line: &str) -> CommandResult<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (head, rest) = split_word(line);
    let command = match head.to_lowercase().as_str() {
        "load" | "open" => parse_load(rest)?,
        "tabs" => Command::Tabs,
        "tab" => Command::Tab(ordinal(required(rest, "tab <n>")?)?),
        "show" => Command::Show(optional_count(rest)?),
        "columns" | "cols" => Command::Columns((!rest.is_empty()).then(|| unquote(rest))),
        "stats" => Command::Stats(unquote(required(rest, "stats <column>")?)),
        "sort" => {
            let direction = |word: &str| {
                rest.strip_suffix(word)
                    .filter(|column| column.ends_with(char::is_whitespace))
            };
            let (column, descending) = match (direction("desc"), direction("asc")) {
                (Some(column), _) => (column, true),
                (None, Some(column)) => (column, false),
                (None, None) => (rest, false),
            };
            let column = unquote(column);
            if column.is_empty() {
                return Err(CommandError::Usage("sort <column> [asc|desc]"));
            }
            Command::Sort {
                column,
                ascending: !descending,
            }
        }
        "filter" | "f" => parse_filter(rest)?,
        "search" | "/" => parse_search(rest)?,
        "view" => Command::View(
            required(rest, "view all|highlighted|unhighlighted")?
                .parse::<HighlightFilter>()
                .map_err(CommandError::Invalid)?,
        ),
        "newtab" => Command::NewTab(unquote(required(rest, "newtab <name>")?)),
        "dup" | "duplicate" => Command::Duplicate,
        "close" => Command::Close(if rest.is_empty() { None } else { Some(ordinal(rest)?) }),
        "rename" => Command::Rename(unquote(required(rest, "rename <name>")?)),
        "filtered" => match rest {
            "matches" | "matched" => Command::FilteredMode(true),
            "unmatched" | "rest" => Command::FilteredMode(false),
            _ => return Err(CommandError::Usage("filtered matches|unmatched")),
        },
        "edit" => parse_edit(rest)?,
        "move-highlighted" => Command::MoveHighlighted,
        "copy-highlighted" => Command::CopyHighlighted,
        "export" => {
            const USAGE: &str = "export all|tab|filtered <path>";
            let (scope, path) = split_word(rest);
            if path.is_empty() {
                return Err(CommandError::Usage(USAGE));
            }
            Command::Export {
                scope: scope.parse().map_err(|_| CommandError::Usage(USAGE))?,
                path: PathBuf::from(unquote(path)),
            }
        }
        "save" => Command::Save(PathBuf::from(unquote(required(rest, "save <path>")?))),
        "preset" => parse_preset(rest)?,
        "archive" => parse_archive(rest)?,
        "logs" => Command::Logs(optional_count(rest)?),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Command words offered by tab completion
pub const COMMAND_WORDS: &[&str] = &[
    "load", "tabs", "tab", "show", "columns", "stats", "sort", "filter", "search", "view",
    "newtab", "dup", "close", "rename", "filtered", "edit", "move-highlighted",
    "copy-highlighted", "export", "save", "preset", "archive", "logs", "help", "quit",
];
