//! Key combinations and the binding table
//!
//! A [`KeyCombo`] is written the way the configuration file spells it:
//! modifier names and exactly one keysym name joined by `+`, for example
//! `Ctrl+Alt+Return` or `Logo+F1`. Matching masks the event modifiers
//! first, so locks outside the mask (Caps Lock by default) never stop a
//! binding from firing.

use bitflags::bitflags;
use log::debug;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use xkbcommon::xkb;

bitflags! {
    /// XKB core modifiers, in the bit order of the core protocol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CAPS = 1 << 1;
        const CTRL = 1 << 2;
        const ALT = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const LOGO = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

impl Modifiers {
    /// Every named modifier; Caps Lock is left out.
    pub const DEFAULT_MASK: Modifiers = Modifiers::SHIFT
        .union(Modifiers::CTRL)
        .union(Modifiers::ALT)
        .union(Modifiers::MOD2)
        .union(Modifiers::MOD3)
        .union(Modifiers::LOGO)
        .union(Modifiers::MOD5);
}

/// Names accepted in combos, in the order combos are written.
const MODIFIER_NAMES: [(&str, Modifiers); 7] = [
    ("Shift", Modifiers::SHIFT),
    ("Ctrl", Modifiers::CTRL),
    ("Alt", Modifiers::ALT),
    ("Mod2", Modifiers::MOD2),
    ("Mod3", Modifiers::MOD3),
    ("Logo", Modifiers::LOGO),
    ("Mod5", Modifiers::MOD5),
];

fn modifier_from_name(name: &str) -> Option<Modifiers> {
    MODIFIER_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, m)| *m)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyComboError {
    #[error("empty key combination")]
    Empty,

    #[error("\"{0}\" names no keysym")]
    NoKeysym(String),

    #[error("\"{0}\" names more than one keysym")]
    MultipleKeysyms(String),

    #[error("\"{token}\" in \"{combo}\" is neither a modifier nor a keysym")]
    UnknownToken { combo: String, token: String },
}

/// Looks up a keysym by name, preferring an exact match.
pub fn keysym_from_name(name: &str) -> Option<xkb::Keysym> {
    let exact = xkb::keysym_from_name(name, xkb::KEYSYM_NO_FLAGS);
    if exact.raw() != xkb::keysyms::KEY_NoSymbol {
        return Some(exact);
    }
    let folded = xkb::keysym_from_name(name, xkb::KEYSYM_CASE_INSENSITIVE);
    (folded.raw() != xkb::keysyms::KEY_NoSymbol).then_some(folded)
}

/// Lower-cases Latin-1 letter keysyms; everything else is returned as is.
pub fn fold_case(keysym: xkb::Keysym) -> xkb::Keysym {
    let raw = keysym.raw();
    let upper_ascii = (xkb::keysyms::KEY_A..=xkb::keysyms::KEY_Z).contains(&raw);
    let upper_latin1 = (xkb::keysyms::KEY_Agrave..=xkb::keysyms::KEY_THORN).contains(&raw)
        && raw != xkb::keysyms::KEY_multiply;
    if upper_ascii || upper_latin1 {
        xkb::Keysym::new(raw + 0x20)
    } else {
        keysym
    }
}

/// A parsed key combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub modifiers: Modifiers,
    pub mask: Modifiers,
    pub keysym: xkb::Keysym,
    pub ignore_case: bool,
}

impl KeyCombo {
    pub fn new(modifiers: Modifiers, keysym: xkb::Keysym) -> Self {
        Self {
            modifiers,
            mask: Modifiers::DEFAULT_MASK,
            keysym,
            ignore_case: true,
        }
    }

    pub fn with_mask(mut self, mask: Modifiers) -> Self {
        self.mask = mask;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.ignore_case = false;
        self
    }

    pub fn matches(&self, modifiers: Modifiers, keysym: xkb::Keysym) -> bool {
        if modifiers & self.mask != self.modifiers {
            return false;
        }
        if self.ignore_case {
            fold_case(keysym) == fold_case(self.keysym)
        } else {
            keysym == self.keysym
        }
    }
}

impl FromStr for KeyCombo {
    type Err = KeyComboError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.trim().is_empty() {
            return Err(KeyComboError::Empty);
        }
        let mut modifiers = Modifiers::empty();
        let mut keysym = None;
        for token in text.split('+').map(str::trim) {
            if let Some(modifier) = modifier_from_name(token) {
                modifiers |= modifier;
                continue;
            }
            let sym = keysym_from_name(token).ok_or_else(|| KeyComboError::UnknownToken {
                combo: text.to_string(),
                token: token.to_string(),
            })?;
            if keysym.replace(sym).is_some() {
                return Err(KeyComboError::MultipleKeysyms(text.to_string()));
            }
        }
        let keysym = keysym.ok_or_else(|| KeyComboError::NoKeysym(text.to_string()))?;
        Ok(KeyCombo::new(modifiers, keysym))
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, modifier) in MODIFIER_NAMES {
            if self.modifiers.contains(modifier) {
                write!(f, "{}+", name)?;
            }
        }
        f.write_str(&xkb::keysym_get_name(self.keysym))
    }
}

/// Ordered binding table. Lookup is a linear scan; the caller decides
/// whether a match claims the key.
#[derive(Debug, Clone)]
pub struct KeyBindings<T> {
    bindings: Vec<(KeyCombo, T)>,
}

impl<T> Default for KeyBindings<T> {
    fn default() -> Self {
        Self { bindings: Vec::new() }
    }
}

impl<T> KeyBindings<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, combo: KeyCombo, value: T) {
        debug!("⌨️ Binding {}", combo);
        self.bindings.push((combo, value));
    }

    /// Removes every binding for exactly this combination.
    pub fn unbind(&mut self, combo: &KeyCombo) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|(c, _)| c != combo);
        before - self.bindings.len()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(KeyCombo, T)> {
        self.bindings.iter()
    }

    /// Matching bindings in registration order.
    pub fn matches(&self, modifiers: Modifiers, keysym: xkb::Keysym) -> impl Iterator<Item = &T> {
        self.bindings
            .iter()
            .filter(move |(combo, _)| combo.matches(modifiers, keysym))
            .map(|(_, value)| value)
    }

    /// Offers the key to each matching binding until one claims it.
    pub fn dispatch(
        &self,
        modifiers: Modifiers,
        keysym: xkb::Keysym,
        mut handler: impl FnMut(&T) -> bool,
    ) -> bool {
        self.matches(modifiers, keysym).any(|value| handler(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sym(name: &str) -> xkb::Keysym {
        keysym_from_name(name).expect("known keysym")
    }

    #[test]
    fn test_parse_modifiers_and_keysym() {
        let combo: KeyCombo = "Ctrl+Alt+Return".parse().unwrap();
        assert_eq!(combo.modifiers, Modifiers::CTRL | Modifiers::ALT);
        assert_eq!(combo.keysym, xkb::Keysym::Return);
        assert_eq!(combo.mask, Modifiers::DEFAULT_MASK);
        assert!(!combo.mask.contains(Modifiers::CAPS));

        let combo: KeyCombo = "logo+f1".parse().unwrap();
        assert_eq!(combo.modifiers, Modifiers::LOGO);
        assert_eq!(combo.keysym, xkb::Keysym::F1);
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!("".parse::<KeyCombo>(), Err(KeyComboError::Empty));
        assert_eq!(
            "A+B".parse::<KeyCombo>(),
            Err(KeyComboError::MultipleKeysyms("A+B".to_string()))
        );
        assert_eq!(
            "Shift+Ctrl".parse::<KeyCombo>(),
            Err(KeyComboError::NoKeysym("Shift+Ctrl".to_string()))
        );
        assert!(matches!(
            "Ctrl+NoSuchKeyAnywhere".parse::<KeyCombo>(),
            Err(KeyComboError::UnknownToken { .. })
        ));
    }

    #[test]
    fn test_binding_dispatch_masks_and_folds_case() {
        let mut bindings = KeyBindings::new();
        let combo = "Ctrl+A"
            .parse::<KeyCombo>()
            .unwrap()
            .with_mask(Modifiers::CTRL | Modifiers::SHIFT);
        bindings.bind(combo, "select-all");

        let claim = |_: &&str| true;
        assert!(bindings.dispatch(Modifiers::CTRL, sym("A"), claim));
        assert!(bindings.dispatch(Modifiers::CTRL | Modifiers::ALT, sym("a"), claim));
        assert!(!bindings.dispatch(Modifiers::CTRL | Modifiers::SHIFT, sym("A"), claim));
        assert!(!bindings.dispatch(Modifiers::empty(), sym("A"), claim));
    }

    #[test]
    fn test_unclaimed_binding_falls_through() {
        let mut bindings = KeyBindings::new();
        bindings.bind("Ctrl+q".parse().unwrap(), 1);
        bindings.bind("Ctrl+q".parse().unwrap(), 2);

        let mut seen = Vec::new();
        let claimed = bindings.dispatch(Modifiers::CTRL, sym("q"), |v| {
            seen.push(*v);
            *v == 2
        });
        assert!(claimed);
        assert_eq!(seen, vec![1, 2]);

        assert!(!bindings.dispatch(Modifiers::CTRL | Modifiers::CAPS, sym("q"), |_| false));
        assert_eq!(bindings.unbind(&"Ctrl+q".parse().unwrap()), 2);
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_case_sensitive_combo() {
        let combo = KeyCombo::new(Modifiers::empty(), sym("a")).case_sensitive();
        assert!(combo.matches(Modifiers::empty(), sym("a")));
        assert!(!combo.matches(Modifiers::empty(), sym("A")));
    }

    const NAMES: &[&str] = &[
        "a", "z", "A", "Q", "1", "0", "F1", "F12", "Return", "Escape", "Tab", "space",
        "BackSpace", "Left", "Page_Down", "XF86AudioMute", "Print",
    ];

    proptest! {
        #[test]
        fn prop_format_then_parse_round_trips(
            bits in 0u32..256,
            index in 0..NAMES.len(),
        ) {
            let modifiers = Modifiers::from_bits_truncate(bits) & Modifiers::DEFAULT_MASK;
            let combo = KeyCombo::new(modifiers, sym(NAMES[index]));
            let parsed: KeyCombo = combo.to_string().parse().unwrap();
            prop_assert_eq!(parsed, combo);
        }
    }
}
