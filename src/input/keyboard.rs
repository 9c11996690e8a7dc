//! XKB keyboard state
//!
//! Keymaps come either from RMLVO names or from a keymap file. Hardware
//! keycodes arrive in evdev numbering and are shifted by 8 before they
//! reach XKB.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xkbcommon::xkb;

use crate::input::keybinding::Modifiers;
use crate::protocol::SerializedModifiers;

/// Distance between evdev and XKB keycodes.
pub const XKB_KEYCODE_OFFSET: u32 = 8;

#[derive(Debug, Error)]
pub enum KeyboardError {
    #[error("cannot compile keymap for {0}")]
    Names(Rmlvo),

    #[error("cannot read keymap file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot compile keymap file {0}")]
    File(PathBuf),
}

/// Rules, model, layout, variant and options naming a keymap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Rmlvo {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: Option<String>,
}

impl Default for Rmlvo {
    fn default() -> Self {
        Self {
            rules: "evdev".to_string(),
            model: "pc105".to_string(),
            layout: "us".to_string(),
            variant: String::new(),
            options: None,
        }
    }
}

impl fmt::Display for Rmlvo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.rules,
            self.model,
            self.layout,
            self.variant,
            self.options.as_deref().unwrap_or("")
        )
    }
}

/// Key repeat as advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RepeatInfo {
    /// Milliseconds before repeating starts.
    #[serde(deserialize_with = "crate::config::de::number")]
    pub delay: u32,
    /// Repeats per second.
    #[serde(deserialize_with = "crate::config::de::number")]
    pub rate: u32,
}

impl Default for RepeatInfo {
    fn default() -> Self {
        Self { delay: 300, rate: 25 }
    }
}

/// Where the keymap comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeymapSource {
    Names(Rmlvo),
    File(PathBuf),
}

/// Result of feeding one key to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInput {
    pub keysyms: Vec<xkb::Keysym>,
    /// Modifiers in effect when the key was pressed.
    pub modifiers: Modifiers,
    /// Set when the key changed the serialized modifier state.
    pub serialized: Option<SerializedModifiers>,
}

pub struct Keyboard {
    keymap: xkb::Keymap,
    state: xkb::State,
    source: KeymapSource,
    serialized: SerializedModifiers,
}

impl fmt::Debug for Keyboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyboard")
            .field("source", &self.source)
            .field("serialized", &self.serialized)
            .finish()
    }
}

impl Keyboard {
    pub fn new(source: &KeymapSource) -> Result<Self, KeyboardError> {
        match source {
            KeymapSource::Names(names) => Self::from_names(names),
            KeymapSource::File(path) => Self::from_file(path),
        }
    }

    pub fn from_names(names: &Rmlvo) -> Result<Self, KeyboardError> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            &names.rules,
            &names.model,
            &names.layout,
            &names.variant,
            names.options.clone(),
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| KeyboardError::Names(names.clone()))?;
        info!("⌨️ Keymap compiled from {}", names);
        Ok(Self::with_keymap(keymap, KeymapSource::Names(names.clone())))
    }

    pub fn from_file(path: &Path) -> Result<Self, KeyboardError> {
        let text = std::fs::read_to_string(path).map_err(|source| KeyboardError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_string(
            &context,
            text,
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| KeyboardError::File(path.to_path_buf()))?;
        info!("⌨️ Keymap loaded from {}", path.display());
        Ok(Self::with_keymap(keymap, KeymapSource::File(path.to_path_buf())))
    }

    fn with_keymap(keymap: xkb::Keymap, source: KeymapSource) -> Self {
        let state = xkb::State::new(&keymap);
        Self {
            keymap,
            state,
            source,
            serialized: SerializedModifiers::default(),
        }
    }

    pub fn source(&self) -> &KeymapSource {
        &self.source
    }

    /// The keymap in text form, as sent to clients.
    pub fn keymap_string(&self) -> String {
        self.keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1)
    }

    /// Currently effective modifiers.
    pub fn modifiers(&self) -> Modifiers {
        const NAMES: [(&str, Modifiers); 8] = [
            (xkb::MOD_NAME_SHIFT, Modifiers::SHIFT),
            (xkb::MOD_NAME_CAPS, Modifiers::CAPS),
            (xkb::MOD_NAME_CTRL, Modifiers::CTRL),
            (xkb::MOD_NAME_ALT, Modifiers::ALT),
            (xkb::MOD_NAME_NUM, Modifiers::MOD2),
            ("Mod3", Modifiers::MOD3),
            (xkb::MOD_NAME_LOGO, Modifiers::LOGO),
            ("Mod5", Modifiers::MOD5),
        ];
        NAMES
            .iter()
            .filter(|(name, _)| self.state.mod_name_is_active(name, xkb::STATE_MODS_EFFECTIVE))
            .fold(Modifiers::empty(), |acc, (_, m)| acc | *m)
    }

    pub fn serialized_modifiers(&self) -> SerializedModifiers {
        self.serialized
    }

    /// Feeds a key and returns what it produced. Keysyms are looked up
    /// before the state changes, so a modifier key reports its own sym.
    pub fn key(&mut self, keycode: u32, pressed: bool) -> KeyInput {
        let xkb_keycode = xkb::Keycode::new(keycode + XKB_KEYCODE_OFFSET);
        let keysyms = self.state.key_get_syms(xkb_keycode).to_vec();
        let modifiers = self.modifiers();
        let direction = if pressed {
            xkb::KeyDirection::Down
        } else {
            xkb::KeyDirection::Up
        };
        self.state.update_key(xkb_keycode, direction);

        let serialized = SerializedModifiers {
            depressed: self.state.serialize_mods(xkb::STATE_MODS_DEPRESSED),
            latched: self.state.serialize_mods(xkb::STATE_MODS_LATCHED),
            locked: self.state.serialize_mods(xkb::STATE_MODS_LOCKED),
            group: self.state.serialize_layout(xkb::STATE_LAYOUT_EFFECTIVE),
        };
        let changed = serialized != self.serialized;
        if changed {
            debug!("⌨️ Modifiers now {:?}", serialized);
            self.serialized = serialized;
        }
        KeyInput {
            keysyms,
            modifiers,
            serialized: changed.then_some(serialized),
        }
    }
}
