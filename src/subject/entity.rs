/// Entity type and identifier definitions
///
/// An entity type names one catalogue category; a subject identifier names one
/// item inside it.
use crate::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Catalogue category whose ranking pages and subjects are collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Anime,
    Book,
    Music,
    Game,
    /// Live-action (TV drama and film)
    Real,
}

impl EntityType {
    /// All known entity types, in the order the site lists them
    pub const ALL: [EntityType; 5] = [
        Self::Anime,
        Self::Book,
        Self::Music,
        Self::Game,
        Self::Real,
    ];

    /// Returns the path segment used by the site for this category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anime => "anime",
            Self::Book => "book",
            Self::Music => "music",
            Self::Game => "game",
            Self::Real => "real",
        }
    }
}

impl FromStr for EntityType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|entity| entity.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownEntityType(s.to_string()))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque token naming one catalogue subject
///
/// Kept as the literal text found in the ranking page so that nothing about
/// its shape (leading zeros, non-numeric ids) is lost on a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for SubjectId {
    fn from(token: String) -> Self {
        Self(token)
    }
}
