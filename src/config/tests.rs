//! Unit tests for configuration module
//!
//! Tests section decoding, defaults, validation and the error reporting of
//! malformed files.

use super::*;
use crate::action::Action;
use crate::input::keybinding::Modifiers;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;
use xkbcommon::xkb;

#[test]
fn test_builtin_configuration_is_valid() -> Result<()> {
    let config = Config::builtin()?;

    assert_eq!(config.terminal, "foot");
    assert_eq!(config.keyboard.xkb_rmlvo.layout, "us");
    assert_eq!(config.keyboard.repeat, RepeatInfo { delay: 300, rate: 25 });
    assert_eq!(config.decoration.mode, DecorationPolicy::SuggestServer);
    assert_eq!(config.workspaces.len(), 2);
    assert_eq!(config.hot_corner.delay(), Duration::from_millis(500));
    assert!(config.dock.enabled);
    assert_eq!(config.dock.launchers[0].command_line, "foot");

    let quit = config
        .key_bindings
        .iter()
        .find(|b| b.action.action == Action::Quit)
        .expect("Quit is bound");
    assert_eq!(
        quit.combo,
        KeyCombo::new(Modifiers::CTRL | Modifiers::ALT | Modifiers::LOGO, xkb::Keysym::Q)
    );
    assert!(config
        .key_bindings
        .iter()
        .any(|b| b.action.action == Action::SwitchToVt(12)));
    Ok(())
}

#[test]
fn test_empty_dictionary_is_the_default() -> Result<()> {
    let config: Config = "{}".parse()?;
    assert_eq!(config, Config::default());
    config.validate()?;
    assert_eq!(config.workspace_styles()[0].name, "Main");
    assert_eq!(config.workspace_styles()[0].background, DEFAULT_WORKSPACE_COLOR);
    Ok(())
}

#[test]
fn test_sections_accept_plist_scalars() -> Result<()> {
    let config: Config = r##"{
        Keyboard = {
            XkbConfigurationFile = "/etc/lodestar/keymap.xkb";
            Repeat = { Delay = 250; Rate = 40; };
        };
        Decoration = { Mode = EnforceClient; BorderWidth = 3; };
        ScreenLock = { IdleSeconds = 0; Command = "swaylock"; };
        Dock = { Enabled = No; };
        Outputs = { "HDMI-A-1" = { Scale = 1.5; Position = "1920, 0"; }; };
        Workspaces = ({ Name = Code; }, { Name = Web; Color = "#102030"; });
    }"##
    .parse()?;

    assert_eq!(
        config.keyboard.keymap_source(),
        KeymapSource::File(PathBuf::from("/etc/lodestar/keymap.xkb"))
    );
    assert_eq!(config.keyboard.repeat, RepeatInfo { delay: 250, rate: 40 });
    assert_eq!(config.decoration.mode, DecorationPolicy::EnforceClient);
    assert_eq!(config.decoration.theme().border_width, 3);
    assert_eq!(config.screen_lock.idle_seconds, 0);
    assert_eq!(config.screen_lock.command.as_deref(), Some("swaylock"));
    assert!(!config.dock.enabled);
    assert!(config.clip.enabled);

    let output = config.outputs["HDMI-A-1"];
    assert_eq!(output.scale, 1.5);
    assert_eq!(output.position, Some(Point::new(1920, 0)));

    let styles = config.workspace_styles();
    assert_eq!(styles[1].name, "Web");
    assert_eq!(styles[1].background, Color(0xff10_2030));
    Ok(())
}

#[test]
fn test_key_bindings_with_arguments() -> Result<()> {
    let config: Config = r#"{
        KeyBindings = {
            "Logo+Return" = (ShellExecute, "foot --server");
            "Logo+E" = (Execute, "thunar");
            "Logo+Q" = (WindowClose);
        };
    }"#
    .parse()?;
    let actions: Vec<String> = config.key_bindings.iter().map(|b| b.action.to_string()).collect();
    assert_eq!(
        actions,
        vec!["ShellExecute(\"foot --server\")", "Execute(\"thunar\")", "WindowClose"]
    );
    Ok(())
}

#[test]
fn test_root_menu_nesting() -> Result<()> {
    let config: Config = r#"{
        RootMenu = (
            Lodestar,
            (Terminal, ShellExecute, "foot"),
            (Workspaces, (Add, WorkspaceAdd), ("Destroy last", WorkspaceDestroyLast)),
            (Exit, Quit)
        );
    }"#
    .parse()?;
    let Some(MenuEntry::Submenu { label, entries }) = config.root_menu else {
        panic!("expected a titled root menu");
    };
    assert_eq!(label, "Lodestar");
    assert_eq!(entries.len(), 3);
    assert_eq!(
        entries[0],
        MenuEntry::Item {
            label: "Terminal".to_string(),
            action: BoundAction::with_argument(Action::ShellExecute, "foot"),
        }
    );
    match &entries[1] {
        MenuEntry::Submenu { label, entries } => {
            assert_eq!(label, "Workspaces");
            assert_eq!(entries[1].label(), "Destroy last");
        }
        other => panic!("unexpected {:?}", other),
    }
    Ok(())
}

#[test]
fn test_bad_input_is_reported() {
    let err = "{ KeyBindings = { \"Ctrl+Shift\" = Quit; }; }"
        .parse::<Config>()
        .unwrap_err();
    assert!(matches!(err, ConfigError::KeyCombo { .. }));

    let err = "{ KeyBindings = { \"Ctrl+A\" = Frobnicate; }; }"
        .parse::<Config>()
        .unwrap_err();
    assert!(err.to_string().contains("unknown action \"Frobnicate\""));

    let err = "{ KeyBindings = { \"Ctrl+A\" = Execute; }; }"
        .parse::<Config>()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Action { .. }));

    let err = "{ Keyboard = { Repeat = { Delay = soon; }; }; }"
        .parse::<Config>()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Section { ref section, .. } if section == "Keyboard"));

    let err = "{ Decoration = { Mode = Sometimes; }; }".parse::<Config>().unwrap_err();
    assert!(matches!(err, ConfigError::Section { .. }));

    assert!(matches!("(a, b)".parse::<Config>(), Err(ConfigError::NotADictionary("array"))));
    assert!(matches!("{ A = ".parse::<Config>(), Err(ConfigError::Parse(_))));
}

#[test]
fn test_validation_rejects_out_of_range_values() {
    let mut config = Config::default();
    config.decoration.border_width = -1;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config
        .outputs
        .insert("DP-1".to_string(), OutputConfig { scale: 8.0, position: None });
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.hot_corner.top_left_enter = Some("Nope".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_configuration_from_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("lodestar.plist");
    fs::write(&path, "{ Terminal = \"alacritty\"; HotCorner = { EnterDelay = 250; }; }")?;

    let config = Config::load(&path)?;
    assert_eq!(config.terminal, "alacritty");
    assert_eq!(config.hot_corner.delay(), Duration::from_millis(250));

    fs::write(&path, "{\n  Terminal = ;\n}")?;
    let err = Config::load(&path).unwrap_err();
    let chain = format!("{:#}", err);
    assert!(chain.contains("lodestar.plist"));
    assert!(chain.contains("line 2"));

    assert!(Config::load(dir.path().join("missing.plist")).is_err());
    Ok(())
}

#[test]
fn test_output_state_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("state.plist");
    assert!(load_output_state(&path)?.is_empty());

    fs::write(&path, "{ Outputs = { eDP-1 = { Scale = 2; }; }; }")?;
    let state = load_output_state(&path)?;
    assert_eq!(state["eDP-1"].scale, 2.0);

    let mut config = Config::default();
    config.merge_output_state(state);
    assert_eq!(config.outputs["eDP-1"].scale, 2.0);
    Ok(())
}
