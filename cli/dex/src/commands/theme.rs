use anyhow::Result;
use bpaf::Bpaf;
use dex_core::{Theme as ThemeChoice, ThemePreference};

use super::Session;
use crate::config::Config;
use crate::utils::message;

// Show or change the color theme
#[derive(Debug, Bpaf, Clone)]
pub struct Theme {
    /// 'light', 'dark' or 'toggle', shows the current theme if omitted
    #[bpaf(positional("light|dark|toggle"))]
    pub action: Option<ThemeAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeAction {
    Set(ThemeChoice),
    Toggle,
}

impl std::str::FromStr for ThemeAction {
    type Err = dex_core::theme::ParseThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "toggle" => Ok(ThemeAction::Toggle),
            other => other.parse().map(ThemeAction::Set),
        }
    }
}

impl Theme {
    pub fn handle(self, config: Config) -> Result<()> {
        let session = Session::open(config)?;
        self.run(&session);
        Ok(())
    }

    fn run(self, session: &Session) -> ThemeChoice {
        let preference = ThemePreference::load(session.storage(), None);
        match self.action {
            None => {
                let theme = preference.get();
                println!("{theme}");
                theme
            },
            Some(ThemeAction::Set(theme)) => {
                preference.set(theme);
                message::updated(format!("Theme set to {theme}"));
                theme
            },
            Some(ThemeAction::Toggle) => {
                let theme = preference.toggle();
                message::updated(format!("Theme set to {theme}"));
                theme
            },
        }
    }
}
