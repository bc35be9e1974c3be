// ── Color schemes and theme value types ──

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Current version of [`ThemeSettings`].
pub const SETTINGS_VERSION: u32 = 1;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ColorMode {
    #[default]
    Light,
    Dark,
}

impl ColorMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::Dark => "Dark",
        }
    }
}

/// Display metadata for a registered color scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeDescriptor {
    pub name: String,
    pub description: String,
    pub category: String,
}

impl SchemeDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
        }
    }
}

/// Insertion-ordered set of known color schemes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemeRegistry(IndexMap<String, SchemeDescriptor>);

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemeRegistry {
    /// The schemes every dashboard ships with.
    pub fn builtin() -> Self {
        let mut schemes = IndexMap::new();
        for (key, name, description, category) in [
            ("default", "Default", "Clean blue accents", "neutral"),
            ("ocean", "Ocean", "Deep sea blues and teals", "cool"),
            ("forest", "Forest", "Natural greens", "natural"),
            ("sunset", "Sunset", "Warm oranges and pinks", "warm"),
            ("purple", "Purple", "Royal purple tones", "vibrant"),
        ] {
            schemes.insert(key.to_owned(), SchemeDescriptor::new(name, description, category));
        }
        Self(schemes)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&SchemeDescriptor> {
        self.0.get(key)
    }

    /// Insert or overwrite. Overwriting keeps the original position.
    pub fn register(&mut self, key: impl Into<String>, descriptor: SchemeDescriptor) {
        self.0.insert(key.into(), descriptor);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The scheme after (or before) `key`, wrapping at both ends.
    pub(crate) fn neighbor(&self, key: &str, forward: bool) -> Option<&str> {
        let len = self.0.len();
        let index = self.0.get_index_of(key)?;
        let target = if forward {
            (index + 1) % len
        } else {
            (index + len - 1) % len
        };
        self.0.get_index(target).map(|(k, _)| k.as_str())
    }

    /// Every mode paired with every scheme, light first.
    pub fn combinations(&self) -> Vec<ThemeCombination> {
        [ColorMode::Light, ColorMode::Dark]
            .into_iter()
            .flat_map(|mode| {
                self.0.iter().map(move |(key, descriptor)| ThemeCombination {
                    mode,
                    scheme: key.clone(),
                    name: format!("{} {}", mode.title(), descriptor.name),
                    description: descriptor.description.clone(),
                    category: descriptor.category.clone(),
                    preview: format!("{mode}-{key}"),
                })
            })
            .collect()
    }
}

/// One selectable mode + scheme pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeCombination {
    pub mode: ColorMode,
    pub scheme: String,
    /// Display name, e.g. `"Dark Ocean"`.
    pub name: String,
    pub description: String,
    pub category: String,
    /// Preview identifier, e.g. `"dark-ocean"`.
    pub preview: String,
}

/// Full reconciled preference state, as published on theme events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeState {
    pub mode: ColorMode,
    pub scheme: String,
    pub scheme_data: Option<SchemeDescriptor>,
    pub system_preference: ColorMode,
    pub initialized: bool,
    /// Registered scheme keys in registry order.
    pub available: Vec<String>,
    /// Every mode × scheme pair, light first, in registry order.
    pub combinations: Vec<ThemeCombination>,
}

/// Portable snapshot of the user's choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeSettings {
    pub version: u32,
    pub mode: ColorMode,
    pub scheme: String,
    pub exported_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_order_is_stable() {
        let registry = SchemeRegistry::builtin();
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys, vec!["default", "ocean", "forest", "sunset", "purple"]);
        assert_eq!(registry.get("forest").unwrap().category, "natural");
    }

    #[test]
    fn neighbor_wraps_both_ways() {
        let registry = SchemeRegistry::builtin();
        assert_eq!(registry.neighbor("purple", true), Some("default"));
        assert_eq!(registry.neighbor("default", false), Some("purple"));
        assert_eq!(registry.neighbor("ocean", true), Some("forest"));
        assert_eq!(registry.neighbor("nope", true), None);
    }

    #[test]
    fn register_overwrites_in_place() {
        let mut registry = SchemeRegistry::builtin();
        registry.register("ocean", SchemeDescriptor::new("Ocean 2", "Bluer", "cool"));
        registry.register("mono", SchemeDescriptor::new("Mono", "Greyscale", "neutral"));
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys[1], "ocean");
        assert_eq!(keys.last(), Some(&"mono"));
        assert_eq!(registry.get("ocean").unwrap().name, "Ocean 2");
    }

    #[test]
    fn combinations_cover_mode_scheme_product() {
        let combos = SchemeRegistry::builtin().combinations();
        assert_eq!(combos.len(), 10);

        let dark_ocean = combos
            .iter()
            .find(|c| c.mode == ColorMode::Dark && c.scheme == "ocean")
            .unwrap();
        insta::assert_json_snapshot!(dark_ocean, @r#"
        {
          "mode": "dark",
          "scheme": "ocean",
          "name": "Dark Ocean",
          "description": "Deep sea blues and teals",
          "category": "cool",
          "preview": "dark-ocean"
        }
        "#);
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Dark".parse::<ColorMode>().unwrap(), ColorMode::Dark);
        assert!("sepia".parse::<ColorMode>().is_err());
        assert_eq!(ColorMode::Light.toggled(), ColorMode::Dark);
    }
}
