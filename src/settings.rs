//! Learner preferences persisted as one JSON blob, plus theme resolution.

pub mod kv;

use std::mem::discriminant;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

pub use kv::{FileStore, KeyValueStore, MemoryStore};

pub const SETTINGS_KEY: &str = "learnova_settings_v1";
pub const THEME_KEY: &str = "theme";
pub const NAME_KEY: &str = "learner_name";
pub const AVATAR_KEY: &str = "avatar_url";
const DEFAULT_NAME: &str = "Learner";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

/// What a [`ThemeMode`] resolves to at a given moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyDifficulty {
    #[default]
    Adaptive,
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub name: String,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppearanceSettings {
    pub theme: ThemeMode,
    pub accent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageSettings {
    pub ui: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub email_weekly: bool,
    pub email_reminders: bool,
    pub in_app_toasts: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySettings {
    pub daily_minutes: u32,
    pub difficulty: StudyDifficulty,
    pub hints: bool,
    pub retakes_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilitySettings {
    pub voice_enabled: bool,
    pub voice_rate: f64,
    pub voice_pitch: f64,
    pub voice_volume: f64,
    pub font_scale: f64,
    pub high_contrast: bool,
    pub reduced_motion: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub profile: ProfileSettings,
    pub appearance: AppearanceSettings,
    pub language: LanguageSettings,
    pub notifications: NotificationSettings,
    pub study: StudySettings,
    pub accessibility: AccessibilitySettings,
}

impl UserSettings {
    pub fn defaults(name: impl Into<String>) -> Self {
        Self {
            profile: ProfileSettings {
                name: name.into(),
                bio: String::new(),
            },
            appearance: AppearanceSettings {
                theme: ThemeMode::System,
                accent: "violet".to_string(),
            },
            language: LanguageSettings {
                ui: "en".to_string(),
                region: "en-US".to_string(),
            },
            notifications: NotificationSettings {
                email_weekly: true,
                email_reminders: true,
                in_app_toasts: true,
            },
            study: StudySettings {
                daily_minutes: 30,
                difficulty: StudyDifficulty::Adaptive,
                hints: true,
                retakes_allowed: true,
            },
            accessibility: AccessibilitySettings {
                voice_enabled: false,
                voice_rate: 1.0,
                voice_pitch: 1.0,
                voice_volume: 1.0,
                font_scale: 1.0,
                high_contrast: false,
                reduced_motion: false,
            },
        }
    }
}

/// The surface a theme is applied to.
pub trait Presentation {
    /// Platform dark-mode preference, read at call time
    fn prefers_dark(&self) -> bool;
    fn set_dark(&mut self, dark: bool);
}

/// Presentation with a fixed platform preference; records the applied flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentationState {
    pub platform_prefers_dark: bool,
    pub dark: bool,
}

impl Presentation for PresentationState {
    fn prefers_dark(&self) -> bool {
        self.platform_prefers_dark
    }

    fn set_dark(&mut self, dark: bool) {
        self.dark = dark;
    }
}

pub struct SettingsStore<S> {
    kv: S,
}

impl<S: KeyValueStore> SettingsStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn display_name(&self) -> String {
        self.kv
            .get(NAME_KEY)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_NAME.to_string())
    }

    pub fn set_display_name(&self, name: &str) -> anyhow::Result<()> {
        self.kv.set(NAME_KEY, name)
    }

    pub fn avatar_url(&self) -> String {
        self.kv.get(AVATAR_KEY).unwrap_or_default()
    }

    /// Never fails: whatever is stored is merged onto the defaults, field by
    /// field, and anything unusable is replaced by its default.
    pub fn load(&self) -> UserSettings {
        let defaults = UserSettings::defaults(self.display_name());
        let Some(raw) = self.kv.get(SETTINGS_KEY) else {
            return defaults;
        };
        let stored: Value = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("stored settings are not valid JSON, using defaults: {e}");
                return defaults;
            }
        };
        let Ok(mut merged) = serde_json::to_value(&defaults) else {
            return defaults;
        };
        merge(&mut merged, stored);
        UserSettings {
            profile: section(&merged, "profile", defaults.profile),
            appearance: section(&merged, "appearance", defaults.appearance),
            language: section(&merged, "language", defaults.language),
            notifications: section(&merged, "notifications", defaults.notifications),
            study: section(&merged, "study", defaults.study),
            accessibility: section(&merged, "accessibility", defaults.accessibility),
        }
    }

    /// Replaces the stored record wholesale.
    pub fn save(&self, settings: &UserSettings) -> anyhow::Result<()> {
        self.kv.set(SETTINGS_KEY, &serde_json::to_string(settings)?)
    }

    /// Sets the dark flag on `presentation` and records the resolved theme
    /// under [`THEME_KEY`]; the stored `mode` setting is left untouched.
    pub fn apply_theme(&self, mode: ThemeMode, presentation: &mut impl Presentation) {
        let dark = match mode {
            ThemeMode::Dark => true,
            ThemeMode::Light => false,
            ThemeMode::System => presentation.prefers_dark(),
        };
        presentation.set_dark(dark);
        let theme = if dark { Theme::Dark } else { Theme::Light };
        if let Err(e) = self.kv.set(THEME_KEY, theme.as_str()) {
            warn!("failed to record theme: {e}");
        }
    }

    /// Last recorded theme, or the platform preference when none is recorded.
    pub fn stored_theme(&self, presentation: &impl Presentation) -> Theme {
        self.kv
            .get(THEME_KEY)
            .and_then(|t| Theme::parse(&t))
            .unwrap_or(if presentation.prefers_dark() {
                Theme::Dark
            } else {
                Theme::Light
            })
    }

    pub fn toggle_theme(&self, presentation: &mut impl Presentation) -> Theme {
        let (next, mode) = match self.stored_theme(presentation) {
            Theme::Dark => (Theme::Light, ThemeMode::Light),
            Theme::Light => (Theme::Dark, ThemeMode::Dark),
        };
        self.apply_theme(mode, presentation);
        next
    }
}

/// Overlay `stored` onto `base`. Objects merge key by key; a leaf replaces the
/// base only when both are the same JSON kind. Unknown keys are dropped.
fn merge(base: &mut Value, stored: Value) {
    match (base, stored) {
        (Value::Object(base), Value::Object(stored)) => {
            for (key, value) in stored {
                if let Some(slot) = base.get_mut(&key) {
                    merge(slot, value);
                }
            }
        }
        (slot, stored) => {
            if !slot.is_object() && discriminant(slot) == discriminant(&stored) {
                *slot = stored;
            }
        }
    }
}

/// Decode one section. When the merged section is rejected, its fields are
/// taken one at a time on top of the defaults and only the rejected ones are
/// left at their default.
fn section<T: Serialize + DeserializeOwned>(merged: &Value, key: &str, fallback: T) -> T {
    let Some(stored) = merged.get(key) else {
        return fallback;
    };
    let e = match T::deserialize(stored) {
        Ok(section) => return section,
        Err(e) => e,
    };
    warn!("stored {key} settings are partly unusable: {e}");
    let (Some(fields), Ok(mut accepted)) = (stored.as_object(), serde_json::to_value(&fallback)) else {
        return fallback;
    };
    for (field, value) in fields {
        let Some(slot) = accepted.get_mut(field) else {
            continue;
        };
        let previous = std::mem::replace(slot, value.clone());
        if T::deserialize(&accepted).is_err() {
            warn!("stored {key}.{field} is unusable, using its default");
            if let Some(slot) = accepted.get_mut(field) {
                *slot = previous;
            }
        }
    }
    T::deserialize(&accepted).unwrap_or(fallback)
}
