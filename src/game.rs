use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    Me1,
    Me2,
    Me3,
}

impl Default for GameId {
    fn default() -> Self {
        GameId::Me3
    }
}

impl GameId {
    /// Spelling used by descriptors and the catalog manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            GameId::Me1 => "ME1",
            GameId::Me2 => "ME2",
            GameId::Me3 => "ME3",
        }
    }

    pub fn library_dir_name(self) -> &'static str {
        self.as_str()
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        supported_games()
            .into_iter()
            .find(|game| game.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn supported_games() -> Vec<GameId> {
    vec![GameId::Me1, GameId::Me2, GameId::Me3]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(GameId::parse("me2"), Some(GameId::Me2));
        assert_eq!(GameId::parse(" ME3 "), Some(GameId::Me3));
        assert_eq!(GameId::parse("ME4"), None);
    }

    #[test]
    fn library_dirs_match_descriptor_spelling() {
        for game in supported_games() {
            assert_eq!(game.library_dir_name(), game.to_string());
        }
    }
}
