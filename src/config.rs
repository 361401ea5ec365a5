use crate::color::Appearance;

pub const DEFAULT_LIGHT_THEME: &str = "InspiredGitHub";
pub const DEFAULT_DARK_THEME: &str = "base16-ocean.dark";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub appearance: Appearance,
    pub light_theme: String,
    pub dark_theme: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            appearance: Appearance::default(),
            light_theme: DEFAULT_LIGHT_THEME.to_string(),
            dark_theme: DEFAULT_DARK_THEME.to_string(),
        }
    }
}

impl Config {
    pub fn theme_name(&self) -> &str {
        self.theme_for(self.appearance)
    }

    pub fn theme_for(&self, appearance: Appearance) -> &str {
        match appearance {
            Appearance::Light => &self.light_theme,
            Appearance::Dark => &self.dark_theme,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SyntaxCatalog;

    #[test]
    fn theme_follows_appearance() {
        let mut config = Config::default();
        assert_eq!(config.theme_name(), DEFAULT_DARK_THEME);
        config.appearance = Appearance::Light;
        assert_eq!(config.theme_name(), DEFAULT_LIGHT_THEME);
    }

    #[test]
    fn default_themes_are_bundled() {
        let catalog = SyntaxCatalog::load_defaults();
        let config = Config::default();
        assert!(catalog.theme(config.theme_for(Appearance::Light)).is_ok());
        assert!(catalog.theme(config.theme_for(Appearance::Dark)).is_ok());
    }
}
