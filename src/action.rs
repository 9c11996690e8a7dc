//! Named actions
//!
//! Actions are what key bindings, menu items, hot corners and the dock
//! trigger. Their names are the ones written in the configuration file;
//! the server carries them out (`Server::execute`).

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest virtual terminal reachable with `SwitchToVT<n>`.
pub const MAX_VT: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Quit,
    LockScreen,
    LockInhibitBegin,
    LockInhibitEnd,
    LaunchTerminal,
    ShellExecute,
    Execute,

    WorkspacePrevious,
    WorkspaceNext,
    WorkspaceAdd,
    WorkspaceDestroyLast,

    TaskPrevious,
    TaskNext,

    WindowRaise,
    WindowLower,
    WindowToggleFullscreen,
    WindowToggleMaximized,
    WindowMaximize,
    WindowUnmaximize,
    WindowFullscreen,
    WindowShade,
    WindowUnshade,
    WindowMinimize,
    WindowDeiconify,
    WindowClose,
    WindowToNextWorkspace,
    WindowToPreviousWorkspace,

    RootMenu,

    OutputMagnify,
    OutputReduce,
    OutputSaveState,

    /// Switch to virtual terminal 1 to 12.
    SwitchToVt(u8),
}

const NAMES: &[(&str, Action)] = &[
    ("Quit", Action::Quit),
    ("LockScreen", Action::LockScreen),
    ("LockInhibitBegin", Action::LockInhibitBegin),
    ("LockInhibitEnd", Action::LockInhibitEnd),
    ("LaunchTerminal", Action::LaunchTerminal),
    ("ShellExecute", Action::ShellExecute),
    ("Execute", Action::Execute),
    ("WorkspacePrevious", Action::WorkspacePrevious),
    ("WorkspaceNext", Action::WorkspaceNext),
    ("WorkspaceAdd", Action::WorkspaceAdd),
    ("WorkspaceDestroyLast", Action::WorkspaceDestroyLast),
    ("TaskPrevious", Action::TaskPrevious),
    ("TaskNext", Action::TaskNext),
    ("WindowRaise", Action::WindowRaise),
    ("WindowLower", Action::WindowLower),
    ("WindowToggleFullscreen", Action::WindowToggleFullscreen),
    ("WindowToggleMaximized", Action::WindowToggleMaximized),
    ("WindowMaximize", Action::WindowMaximize),
    ("WindowUnmaximize", Action::WindowUnmaximize),
    ("WindowFullscreen", Action::WindowFullscreen),
    ("WindowShade", Action::WindowShade),
    ("WindowUnshade", Action::WindowUnshade),
    ("WindowMinimize", Action::WindowMinimize),
    ("WindowDeiconify", Action::WindowDeiconify),
    ("WindowClose", Action::WindowClose),
    ("WindowToNextWorkspace", Action::WindowToNextWorkspace),
    ("WindowToPreviousWorkspace", Action::WindowToPreviousWorkspace),
    ("RootMenu", Action::RootMenu),
    ("OutputMagnify", Action::OutputMagnify),
    ("OutputReduce", Action::OutputReduce),
    ("OutputSaveState", Action::OutputSaveState),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unknown action \"{0}\"")]
    Unknown(String),

    #[error("{0} needs an argument")]
    MissingArgument(Action),
}

impl Action {
    /// Every action, in configuration-name order.
    pub fn all() -> impl Iterator<Item = Action> {
        NAMES
            .iter()
            .map(|(_, action)| *action)
            .chain((1..=MAX_VT).map(Action::SwitchToVt))
    }

    /// Whether the action cannot run without an argument.
    pub fn requires_argument(self) -> bool {
        matches!(self, Action::ShellExecute | Action::Execute)
    }
}

impl FromStr for Action {
    type Err = ActionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if let Some((_, action)) = NAMES.iter().find(|(n, _)| *n == name) {
            return Ok(*action);
        }
        name.strip_prefix("SwitchToVT")
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|vt| (1..=MAX_VT).contains(vt))
            .map(Action::SwitchToVt)
            .ok_or_else(|| ActionError::Unknown(name.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Action::SwitchToVt(vt) = self {
            return write!(f, "SwitchToVT{}", vt);
        }
        let name = NAMES
            .iter()
            .find(|(_, action)| action == self)
            .map(|(name, _)| *name)
            .unwrap_or("?");
        f.write_str(name)
    }
}

/// An action together with its optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAction {
    pub action: Action,
    pub argument: Option<String>,
}

impl BoundAction {
    pub fn new(action: Action) -> Self {
        Self { action, argument: None }
    }

    pub fn with_argument(action: Action, argument: impl Into<String>) -> Self {
        Self {
            action,
            argument: Some(argument.into()),
        }
    }

    /// Parses an action name and checks the argument is present when needed.
    pub fn parse(name: &str, argument: Option<String>) -> Result<Self, ActionError> {
        let action: Action = name.parse()?;
        if action.requires_argument() && argument.as_deref().map_or(true, str::is_empty) {
            return Err(ActionError::MissingArgument(action));
        }
        Ok(Self { action, argument })
    }
}

impl fmt::Display for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(argument) => write!(f, "{}({:?})", self.action, argument),
            None => write!(f, "{}", self.action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandLineError {
    #[error("empty command line")]
    Empty,

    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),

    #[error("command line ends in a backslash")]
    TrailingBackslash,
}

/// Splits a command line into words the way a POSIX shell would, without
/// expansions: blanks separate words, single quotes are literal, double
/// quotes honour `\"`, `\\`, `\$` and `` \` ``, and a backslash elsewhere
/// escapes the next character.
pub fn split_command_line(line: &str) -> Result<Vec<String>, CommandLineError> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(CommandLineError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(CommandLineError::UnterminatedQuote('"')),
                        },
                        Some(c) => word.push(c),
                        None => return Err(CommandLineError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => word.push(c),
                    None => return Err(CommandLineError::TrailingBackslash),
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    if words.is_empty() {
        return Err(CommandLineError::Empty);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_action_name_parses_back() {
        for action in Action::all() {
            assert_eq!(action.to_string().parse::<Action>(), Ok(action));
        }
        assert_eq!("SwitchToVT12".parse::<Action>(), Ok(Action::SwitchToVt(12)));
        assert!("SwitchToVT13".parse::<Action>().is_err());
        assert!("SwitchToVT0".parse::<Action>().is_err());
        assert_eq!(
            "Frobnicate".parse::<Action>(),
            Err(ActionError::Unknown("Frobnicate".to_string()))
        );
    }

    #[test]
    fn test_execute_requires_argument() {
        assert_eq!(
            BoundAction::parse("Execute", None),
            Err(ActionError::MissingArgument(Action::Execute))
        );
        assert_eq!(
            BoundAction::parse("ShellExecute", Some("foot".into())),
            Ok(BoundAction::with_argument(Action::ShellExecute, "foot"))
        );
        assert_eq!(BoundAction::parse("Quit", None), Ok(BoundAction::new(Action::Quit)));
    }

    #[test]
    fn test_split_plain_words() {
        assert_eq!(
            split_command_line("  foot   --server  ").unwrap(),
            vec!["foot", "--server"]
        );
    }

    #[test]
    fn test_split_quotes_and_escapes() {
        assert_eq!(
            split_command_line(r#"sh -c 'echo "$HOME"' "a \"b\" \n" c\ d"#).unwrap(),
            vec!["sh", "-c", r#"echo "$HOME""#, r#"a "b" \n"#, "c d"]
        );
        assert_eq!(split_command_line("''").unwrap(), vec![""]);
    }

    #[test]
    fn test_split_errors() {
        assert_eq!(split_command_line("   "), Err(CommandLineError::Empty));
        assert_eq!(
            split_command_line("echo 'oops"),
            Err(CommandLineError::UnterminatedQuote('\''))
        );
        assert_eq!(
            split_command_line("echo \"oops"),
            Err(CommandLineError::UnterminatedQuote('"'))
        );
        assert_eq!(split_command_line("echo \\"), Err(CommandLineError::TrailingBackslash));
    }
}
