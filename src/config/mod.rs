//! Configuration management for Lodestar
//!
//! The configuration is a property-list dictionary (see [`plist`]). Typed
//! sections are decoded with serde from the plist tree; `KeyBindings` and
//! `RootMenu` are decoded by hand because their order matters. Every
//! section has defaults, so `{}` is a complete configuration.

pub mod plist;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::action::{ActionError, BoundAction};
use crate::decoration::{DecorationPolicy, DecorationTheme};
use crate::geometry::{Edges, Point};
use crate::hot_corner::CornerActions;
use crate::input::keybinding::{KeyCombo, KeyComboError};
use crate::input::keyboard::{KeymapSource, RepeatInfo, Rmlvo};
use crate::toolkit::element::Color;
use crate::toolkit::root::WorkspaceStyle;

use self::plist::{Dict, PlistError, Value};

/// The configuration used when no file is given.
pub const DEFAULT_CONFIG: &str = include_str!("default.plist");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Parse(#[from] PlistError),

    #[error("the configuration must be a dictionary, found {0}")]
    NotADictionary(&'static str),

    #[error("section {section}: {message}")]
    Section { section: String, message: String },

    #[error("key binding \"{combo}\": {source}")]
    KeyCombo {
        combo: String,
        #[source]
        source: KeyComboError,
    },

    #[error("{context}: {source}")]
    Action {
        context: String,
        #[source]
        source: ActionError,
    },

    #[error("{context}: expected {expected}")]
    Shape { context: String, expected: &'static str },
}

/// Serde helpers for plist scalars, which are always strings.
pub(crate) mod de {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use std::fmt::Display;
    use std::str::FromStr;

    use crate::geometry::Point;
    use crate::toolkit::element::Color;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Number(serde_json::Number),
        Bool(bool),
    }

    impl Scalar {
        fn text(self) -> String {
            match self {
                Scalar::Text(text) => text,
                Scalar::Number(n) => n.to_string(),
                Scalar::Bool(b) => b.to_string(),
            }
        }
    }

    pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let text = Scalar::deserialize(deserializer)?.text();
        text.trim()
            .parse()
            .map_err(|err| D::Error::custom(format!("\"{}\": {}", text, err)))
    }

    pub fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let text = Scalar::deserialize(deserializer)?.text();
        match text.to_ascii_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(true),
            "no" | "false" | "off" | "0" => Ok(false),
            _ => Err(D::Error::custom(format!("\"{}\" is not a boolean", text))),
        }
    }

    pub fn color<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        let text = String::deserialize(deserializer)?;
        Color::parse(&text).ok_or_else(|| D::Error::custom(format!("\"{}\" is not a colour", text)))
    }

    pub fn optional_color<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Color>, D::Error> {
        color(deserializer).map(Some)
    }

    /// `"x,y"`.
    pub fn optional_point<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Point>, D::Error> {
        let text = String::deserialize(deserializer)?;
        let parsed = text
            .split_once(',')
            .and_then(|(x, y)| Some(Point::new(x.trim().parse().ok()?, y.trim().parse().ok()?)));
        parsed
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("\"{}\" is not a position", text)))
    }
}

/// `Keyboard` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct KeyboardConfig {
    #[serde(rename = "XkbRMLVO")]
    pub xkb_rmlvo: Rmlvo,

    /// A keymap file; takes precedence over the RMLVO names.
    pub xkb_configuration_file: Option<PathBuf>,

    pub repeat: RepeatInfo,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            xkb_rmlvo: Rmlvo::default(),
            xkb_configuration_file: None,
            repeat: RepeatInfo::default(),
        }
    }
}

impl KeyboardConfig {
    pub fn keymap_source(&self) -> KeymapSource {
        match &self.xkb_configuration_file {
            Some(path) => KeymapSource::File(path.clone()),
            None => KeymapSource::Names(self.xkb_rmlvo.clone()),
        }
    }
}

/// `Decoration` section: policy and metrics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DecorationConfig {
    pub mode: DecorationPolicy,

    #[serde(deserialize_with = "de::number")]
    pub titlebar_height: i32,

    #[serde(deserialize_with = "de::number")]
    pub border_width: i32,

    #[serde(deserialize_with = "de::number")]
    pub resizebar_height: i32,

    #[serde(deserialize_with = "de::number")]
    pub button_size: i32,

    #[serde(deserialize_with = "de::color")]
    pub titlebar_focused_color: Color,

    #[serde(deserialize_with = "de::color")]
    pub titlebar_blurred_color: Color,
}

impl Default for DecorationConfig {
    fn default() -> Self {
        let theme = DecorationTheme::default();
        Self {
            mode: DecorationPolicy::default(),
            titlebar_height: theme.titlebar_height,
            border_width: theme.border_width,
            resizebar_height: theme.resizebar_height,
            button_size: theme.button_size,
            titlebar_focused_color: theme.titlebar_focused,
            titlebar_blurred_color: theme.titlebar_blurred,
        }
    }
}

impl DecorationConfig {
    pub fn theme(&self) -> DecorationTheme {
        DecorationTheme {
            titlebar_height: self.titlebar_height,
            border_width: self.border_width,
            resizebar_height: self.resizebar_height,
            button_size: self.button_size,
            titlebar_focused: self.titlebar_focused_color,
            titlebar_blurred: self.titlebar_blurred_color,
            ..DecorationTheme::default()
        }
    }
}

/// `HotCorner` section. Actions are given by name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct HotCornerConfig {
    /// Milliseconds the pointer must rest in a corner.
    #[serde(deserialize_with = "de::number")]
    pub enter_delay: u64,

    pub top_left_enter: Option<String>,
    pub top_left_leave: Option<String>,
    pub top_right_enter: Option<String>,
    pub top_right_leave: Option<String>,
    pub bottom_left_enter: Option<String>,
    pub bottom_left_leave: Option<String>,
    pub bottom_right_enter: Option<String>,
    pub bottom_right_leave: Option<String>,
}

impl Default for HotCornerConfig {
    fn default() -> Self {
        Self {
            enter_delay: 500,
            top_left_enter: None,
            top_left_leave: None,
            top_right_enter: None,
            top_right_leave: None,
            bottom_left_enter: None,
            bottom_left_leave: None,
            bottom_right_enter: None,
            bottom_right_leave: None,
        }
    }
}

impl HotCornerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.enter_delay)
    }

    /// Actions in `Corner::ALL` order.
    pub fn actions(&self) -> Result<[CornerActions; 4], ConfigError> {
        let action = |key: &str, name: &Option<String>| -> Result<Option<BoundAction>, ConfigError> {
            name.as_deref()
                .map(|name| {
                    BoundAction::parse(name, None).map_err(|source| ConfigError::Action {
                        context: format!("HotCorner.{}", key),
                        source,
                    })
                })
                .transpose()
        };
        let corner = |enter_key, enter, leave_key, leave| -> Result<CornerActions, ConfigError> {
            Ok(CornerActions {
                enter: action(enter_key, enter)?,
                leave: action(leave_key, leave)?,
            })
        };
        Ok([
            corner("TopLeftEnter", &self.top_left_enter, "TopLeftLeave", &self.top_left_leave)?,
            corner("TopRightEnter", &self.top_right_enter, "TopRightLeave", &self.top_right_leave)?,
            corner(
                "BottomLeftEnter",
                &self.bottom_left_enter,
                "BottomLeftLeave",
                &self.bottom_left_leave,
            )?,
            corner(
                "BottomRightEnter",
                &self.bottom_right_enter,
                "BottomRightLeave",
                &self.bottom_right_leave,
            )?,
        ])
    }
}

/// `ScreenLock` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ScreenLockConfig {
    /// Seconds without input before locking; 0 disables the idle lock.
    #[serde(deserialize_with = "de::number")]
    pub idle_seconds: u64,

    /// The locker to start. Without one, locking is unavailable.
    pub command: Option<String>,

    #[serde(deserialize_with = "de::color")]
    pub curtain_color: Color,
}

impl Default for ScreenLockConfig {
    fn default() -> Self {
        Self {
            idle_seconds: 300,
            command: None,
            curtain_color: Color(0xff22_2222),
        }
    }
}

/// A screen edge, as written in `Positioning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    pub fn edges(self) -> Edges {
        match self {
            Edge::Left => Edges::LEFT,
            Edge::Right => Edges::RIGHT,
            Edge::Top => Edges::TOP,
            Edge::Bottom => Edges::BOTTOM,
        }
    }
}

/// Which edge a dock-like panel sits on, and where along it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Positioning {
    pub edge: Edge,
    pub anchor: Edge,
}

impl Positioning {
    /// Anchor flags for the layer panel.
    pub fn anchor(&self) -> Edges {
        self.edge.edges() | self.anchor.edges()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LauncherConfig {
    pub command_line: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// `Dock` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DockConfig {
    #[serde(deserialize_with = "de::boolean")]
    pub enabled: bool,
    pub positioning: Positioning,
    pub launchers: Vec<LauncherConfig>,
}

impl Default for DockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            positioning: Positioning {
                edge: Edge::Right,
                anchor: Edge::Top,
            },
            launchers: Vec::new(),
        }
    }
}

/// `Clip` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ClipConfig {
    #[serde(deserialize_with = "de::boolean")]
    pub enabled: bool,
    pub positioning: Positioning,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            positioning: Positioning {
                edge: Edge::Right,
                anchor: Edge::Bottom,
            },
        }
    }
}

/// One entry of `Outputs`, keyed by output name. Also the state file format.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct OutputConfig {
    #[serde(deserialize_with = "de::number")]
    pub scale: f64,

    #[serde(deserialize_with = "de::optional_point")]
    pub position: Option<Point>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            position: None,
        }
    }
}

/// One entry of `Workspaces`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkspaceConfig {
    pub name: String,
    #[serde(default, deserialize_with = "de::optional_color")]
    pub color: Option<Color>,
}

/// Background of workspaces that name no colour.
pub const DEFAULT_WORKSPACE_COLOR: Color = Color(0xff50_5a5e);

#[derive(Debug, Clone, PartialEq)]
pub struct KeyBinding {
    pub combo: KeyCombo,
    pub action: BoundAction,
}

/// A `RootMenu` entry.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuEntry {
    Item { label: String, action: BoundAction },
    Submenu { label: String, entries: Vec<MenuEntry> },
}

impl MenuEntry {
    pub fn label(&self) -> &str {
        match self {
            MenuEntry::Item { label, .. } | MenuEntry::Submenu { label, .. } => label,
        }
    }
}

/// Main configuration struct containing all Lodestar settings
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub keyboard: KeyboardConfig,
    pub key_bindings: Vec<KeyBinding>,
    pub decoration: DecorationConfig,
    pub hot_corner: HotCornerConfig,
    pub screen_lock: ScreenLockConfig,
    pub dock: DockConfig,
    pub clip: ClipConfig,
    pub outputs: BTreeMap<String, OutputConfig>,
    pub workspaces: Vec<WorkspaceConfig>,
    /// The root menu, a titled submenu.
    pub root_menu: Option<MenuEntry>,
    /// Command line run by `LaunchTerminal`.
    pub terminal: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keyboard: KeyboardConfig::default(),
            key_bindings: Vec::new(),
            decoration: DecorationConfig::default(),
            hot_corner: HotCornerConfig::default(),
            screen_lock: ScreenLockConfig::default(),
            dock: DockConfig::default(),
            clip: ClipConfig::default(),
            outputs: BTreeMap::new(),
            workspaces: vec![WorkspaceConfig {
                name: "Main".to_string(),
                color: None,
            }],
            root_menu: None,
            terminal: "foot".to_string(),
        }
    }
}

fn section<T: DeserializeOwned + Default>(dict: &Dict, key: &str) -> Result<T, ConfigError> {
    match dict.get(key) {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value.to_json()).map_err(|err| ConfigError::Section {
            section: key.to_string(),
            message: err.to_string(),
        }),
    }
}

fn parse_key_bindings(value: &Value) -> Result<Vec<KeyBinding>, ConfigError> {
    let dict = value.as_dict().ok_or(ConfigError::Shape {
        context: "KeyBindings".to_string(),
        expected: "a dictionary",
    })?;
    dict.iter()
        .map(|(combo, value)| {
            let parsed = combo.parse::<KeyCombo>().map_err(|source| ConfigError::KeyCombo {
                combo: combo.to_string(),
                source,
            })?;
            let context = format!("KeyBindings.{}", combo);
            let action = parse_action(value, &context)?;
            Ok(KeyBinding { combo: parsed, action })
        })
        .collect()
}

/// `Name` or `(Name, Argument)`.
fn parse_action(value: &Value, context: &str) -> Result<BoundAction, ConfigError> {
    let shape = || ConfigError::Shape {
        context: context.to_string(),
        expected: "an action name or (action, argument)",
    };
    let (name, argument) = match value {
        Value::String(name) => (name.as_str(), None),
        Value::Array(items) => match items.as_slice() {
            [Value::String(name)] => (name.as_str(), None),
            [Value::String(name), Value::String(argument)] => (name.as_str(), Some(argument.clone())),
            _ => return Err(shape()),
        },
        Value::Dict(_) => return Err(shape()),
    };
    BoundAction::parse(name, argument).map_err(|source| ConfigError::Action {
        context: context.to_string(),
        source,
    })
}

/// `("Title", entry, ...)` where an entry is `("Label", Action[, "Argument"])`
/// or another titled list.
fn parse_menu(value: &Value, context: &str) -> Result<MenuEntry, ConfigError> {
    let shape = |expected| ConfigError::Shape {
        context: context.to_string(),
        expected,
    };
    let items = value.as_array().ok_or_else(|| shape("a (label, ...) array"))?;
    let Some((Value::String(label), rest)) = items.split_first() else {
        return Err(shape("a label first"));
    };
    let context = format!("{} > {}", context, label);
    match rest {
        [Value::String(action), tail @ ..] if tail.len() <= 1 => {
            let argument = match tail {
                [] => None,
                [Value::String(argument)] => Some(argument.clone()),
                _ => return Err(shape("a string argument")),
            };
            let action = BoundAction::parse(action, argument).map_err(|source| ConfigError::Action {
                context: context.clone(),
                source,
            })?;
            Ok(MenuEntry::Item {
                label: label.clone(),
                action,
            })
        }
        entries => Ok(MenuEntry::Submenu {
            label: label.clone(),
            entries: entries
                .iter()
                .map(|entry| parse_menu(entry, &context))
                .collect::<Result<_, _>>()?,
        }),
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let value = plist::parse(text)?;
        Self::from_value(&value)
    }
}

impl Config {
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let dict = value.as_dict().ok_or(ConfigError::NotADictionary(value.kind()))?;
        let defaults = Config::default();

        let workspaces = match dict.get("Workspaces") {
            None => defaults.workspaces,
            Some(value) => serde_json::from_value(value.to_json()).map_err(|err| ConfigError::Section {
                section: "Workspaces".to_string(),
                message: err.to_string(),
            })?,
        };
        let outputs = match dict.get("Outputs") {
            None => BTreeMap::new(),
            Some(value) => serde_json::from_value(value.to_json()).map_err(|err| ConfigError::Section {
                section: "Outputs".to_string(),
                message: err.to_string(),
            })?,
        };
        let terminal = match dict.get("Terminal") {
            None => defaults.terminal,
            Some(value) => value
                .as_str()
                .map(str::to_string)
                .ok_or(ConfigError::Shape {
                    context: "Terminal".to_string(),
                    expected: "a command line",
                })?,
        };

        Ok(Self {
            keyboard: section(dict, "Keyboard")?,
            key_bindings: dict
                .get("KeyBindings")
                .map(parse_key_bindings)
                .transpose()?
                .unwrap_or_default(),
            decoration: section(dict, "Decoration")?,
            hot_corner: section(dict, "HotCorner")?,
            screen_lock: section(dict, "ScreenLock")?,
            dock: section(dict, "Dock")?,
            clip: section(dict, "Clip")?,
            outputs,
            workspaces,
            root_menu: dict
                .get("RootMenu")
                .map(|value| parse_menu(value, "RootMenu"))
                .transpose()?,
            terminal,
        })
    }

    /// The built-in configuration.
    pub fn builtin() -> Result<Self> {
        let config: Config = DEFAULT_CONFIG
            .parse()
            .context("Failed to parse the built-in configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a property-list file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: Config = contents
            .parse()
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", expanded_path.display()))?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let metrics = [
            ("TitlebarHeight", self.decoration.titlebar_height),
            ("BorderWidth", self.decoration.border_width),
            ("ResizebarHeight", self.decoration.resizebar_height),
            ("ButtonSize", self.decoration.button_size),
        ];
        for (name, value) in metrics {
            if !(0..=256).contains(&value) {
                anyhow::bail!("Invalid Decoration.{}: must be between 0 and 256", name);
            }
        }

        if self.keyboard.repeat.rate > 1000 {
            anyhow::bail!("Invalid Keyboard.Repeat.Rate: must be at most 1000");
        }

        for (name, output) in &self.outputs {
            if !(0.5..=4.0).contains(&output.scale) {
                anyhow::bail!("Invalid Outputs.{}.Scale: must be between 0.5 and 4.0", name);
            }
        }

        if self.workspaces.iter().any(|w| w.name.trim().is_empty()) {
            anyhow::bail!("Invalid Workspaces: names must not be empty");
        }

        if self.dock.launchers.iter().any(|l| l.command_line.trim().is_empty()) {
            anyhow::bail!("Invalid Dock.Launchers: empty command line");
        }

        self.hot_corner.actions()?;

        Ok(())
    }

    /// Workspace names and backgrounds for the root.
    pub fn workspace_styles(&self) -> Vec<WorkspaceStyle> {
        self.workspaces
            .iter()
            .map(|w| WorkspaceStyle::new(&w.name, w.color.unwrap_or(DEFAULT_WORKSPACE_COLOR)))
            .collect()
    }

    /// Applies a saved output state on top of the configured `Outputs`.
    pub fn merge_output_state(&mut self, state: BTreeMap<String, OutputConfig>) {
        self.outputs.extend(state);
    }
}

/// Reads an output state file (`Outputs = { ... };`). A missing file is an
/// empty state.
pub fn load_output_state<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, OutputConfig>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let config: Config = contents
        .parse()
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    Ok(config.outputs)
}

#[cfg(test)]
mod tests;
