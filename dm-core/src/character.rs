//! Character sheet and pre-game selections.
//!
//! A [`CharacterProfile`] is built once, when the adventure starts, from the
//! player's name/backstory and the [`SelectedOptions`] picked beforehand.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Backstory used when the player leaves it blank.
pub const DEFAULT_BACKSTORY: &str = "A wandering adventurer seeking fortune and glory";

/// Races offered by the front-end. Custom strings are also accepted.
pub const RACES: &[&str] = &["Human", "Elf", "Dwarf", "Halfling"];

/// Classes offered by the front-end. Custom strings are also accepted.
pub const CLASSES: &[&str] = &["Warrior", "Mage", "Rogue", "Cleric", "Ranger"];

/// Key used for a free-text setting description.
pub const CUSTOM_SETTING_KEY: &str = "custom";

/// Built-in adventure settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    Classic,
    Dark,
    SciFi,
    Pirate,
}

impl Setting {
    /// All built-in settings, in menu order.
    pub const ALL: [Setting; 4] = [Setting::Classic, Setting::Dark, Setting::SciFi, Setting::Pirate];

    /// Look up a setting by its key.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "classic" => Some(Setting::Classic),
            "dark" => Some(Setting::Dark),
            "scifi" => Some(Setting::SciFi),
            "pirate" => Some(Setting::Pirate),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Setting::Classic => "classic",
            Setting::Dark => "dark",
            Setting::SciFi => "scifi",
            Setting::Pirate => "pirate",
        }
    }

    /// Short menu label.
    pub fn label(&self) -> &'static str {
        match self {
            Setting::Classic => "Classic Fantasy - Kingdoms, dragons, and magic",
            Setting::Dark => "Dark Fantasy - Gothic horror and ancient evils",
            Setting::SciFi => "Sci-Fi Fantasy - Magic meets technology",
            Setting::Pirate => "Pirate Adventure - High seas and treasure",
        }
    }

    /// Description that goes into the opening prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Setting::Classic => {
                "a classic high fantasy world with ancient kingdoms, powerful wizards, fearsome dragons, and epic quests"
            }
            Setting::Dark => {
                "a dark gothic fantasy realm plagued by ancient evils, cursed lands, and eldritch horrors"
            }
            Setting::SciFi => "a unique world where advanced technology and ancient magic coexist",
            Setting::Pirate => {
                "the golden age of piracy with treacherous seas, hidden treasures, and rival pirates"
            }
        }
    }
}

/// A chosen setting: its key plus the description sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingChoice {
    pub key: String,
    pub description: String,
}

impl From<Setting> for SettingChoice {
    fn from(setting: Setting) -> Self {
        Self {
            key: setting.key().to_string(),
            description: setting.description().to_string(),
        }
    }
}

impl SettingChoice {
    /// A player-described setting.
    pub fn custom(description: impl Into<String>) -> Self {
        Self {
            key: CUSTOM_SETTING_KEY.to_string(),
            description: description.into(),
        }
    }
}

/// Pre-game selections, consumed once by `start_adventure`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOptions {
    pub race: Option<String>,
    pub class: Option<String>,
    pub setting: Option<SettingChoice>,
}

impl SelectedOptions {
    pub fn is_empty(&self) -> bool {
        self.race.is_none() && self.class.is_none() && self.setting.is_none()
    }
}

/// A field the player still has to fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Name,
    Race,
    Class,
    Setting,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingField::Name => "name",
            MissingField::Race => "race",
            MissingField::Class => "class",
            MissingField::Setting => "setting",
        };
        f.write_str(name)
    }
}

/// Character creation was attempted with required fields missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required field(s): {}", join_fields(.missing))]
pub struct ValidationError {
    pub missing: Vec<MissingField>,
}

fn join_fields(fields: &[MissingField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The player character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    pub race: String,
    pub class: String,
    pub backstory: String,
    pub setting_key: String,
    pub setting_description: String,
    pub level: u32,
    pub health: u8,
    pub mana: u8,
}

impl Default for CharacterProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            race: String::new(),
            class: String::new(),
            backstory: String::new(),
            setting_key: String::new(),
            setting_description: String::new(),
            level: 1,
            health: 100,
            mana: 100,
        }
    }
}

impl CharacterProfile {
    /// Validate the inputs and build a fresh level-1 character.
    ///
    /// Every missing field is reported, not just the first one.
    pub fn create(
        name: &str,
        backstory: &str,
        options: &SelectedOptions,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        let mut missing = Vec::new();

        if name.is_empty() {
            missing.push(MissingField::Name);
        }
        let race = non_blank(options.race.as_deref());
        if race.is_none() {
            missing.push(MissingField::Race);
        }
        let class = non_blank(options.class.as_deref());
        if class.is_none() {
            missing.push(MissingField::Class);
        }
        let setting = options
            .setting
            .as_ref()
            .filter(|s| !s.description.trim().is_empty());
        if setting.is_none() {
            missing.push(MissingField::Setting);
        }

        match (race, class, setting) {
            (Some(race), Some(class), Some(setting)) if missing.is_empty() => {
                let backstory = backstory.trim();
                Ok(Self {
                    name: name.to_string(),
                    race: race.to_string(),
                    class: class.to_string(),
                    backstory: if backstory.is_empty() {
                        DEFAULT_BACKSTORY.to_string()
                    } else {
                        backstory.to_string()
                    },
                    setting_key: setting.key.clone(),
                    setting_description: setting.description.clone(),
                    ..Self::default()
                })
            }
            _ => Err(ValidationError { missing }),
        }
    }

    /// One-line identity, e.g. "Kira, a Elf Mage".
    pub fn headline(&self) -> String {
        format!("{}, a {} {}", self.name, self.race, self.class)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Normalize a race or class entry against a list of known options.
///
/// Accepts a 1-based menu index or a case-insensitive name; anything else is
/// kept as a custom value.
pub fn resolve_option(input: &str, known: &[&str]) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(index) = input.parse::<usize>() {
        if let Some(name) = index.checked_sub(1).and_then(|i| known.get(i)) {
            return Some((*name).to_string());
        }
    }
    Some(
        known
            .iter()
            .find(|k| k.eq_ignore_ascii_case(input))
            .map(|k| (*k).to_string())
            .unwrap_or_else(|| input.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_options() -> SelectedOptions {
        SelectedOptions {
            race: Some("Elf".to_string()),
            class: Some("Mage".to_string()),
            setting: Some(Setting::Dark.into()),
        }
    }

    #[test]
    fn test_create_character() {
        let character = CharacterProfile::create("  Kira ", "", &full_options()).unwrap();
        assert_eq!(character.name, "Kira");
        assert_eq!(character.backstory, DEFAULT_BACKSTORY);
        assert_eq!(character.setting_key, "dark");
        assert_eq!(character.level, 1);
        assert_eq!(character.health, 100);
        assert_eq!(character.mana, 100);
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let err = CharacterProfile::create("", "", &SelectedOptions::default()).unwrap_err();
        assert_eq!(
            err.missing,
            vec![
                MissingField::Name,
                MissingField::Race,
                MissingField::Class,
                MissingField::Setting
            ]
        );
        assert_eq!(
            err.to_string(),
            "missing required field(s): name, race, class, setting"
        );
    }

    #[test]
    fn test_blank_selection_counts_as_missing() {
        let mut options = full_options();
        options.class = Some("   ".to_string());
        let err = CharacterProfile::create("Kira", "", &options).unwrap_err();
        assert_eq!(err.missing, vec![MissingField::Class]);
    }

    #[test]
    fn test_setting_lookup() {
        assert_eq!(Setting::from_key("DARK"), Some(Setting::Dark));
        assert_eq!(Setting::from_key("western"), None);
        for setting in Setting::ALL {
            assert_eq!(Setting::from_key(setting.key()), Some(setting));
        }
    }

    #[test]
    fn test_resolve_option() {
        assert_eq!(resolve_option("2", RACES).as_deref(), Some("Elf"));
        assert_eq!(resolve_option("dwarf", RACES).as_deref(), Some("Dwarf"));
        assert_eq!(resolve_option("Tiefling", RACES).as_deref(), Some("Tiefling"));
        assert_eq!(resolve_option("9", CLASSES).as_deref(), Some("9"));
        assert_eq!(resolve_option("  ", CLASSES), None);
    }
}
