use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RegistryError;

pub const LOOP: &str = "LOOP";
pub const INTEGER_OVERFLOW: &str = "INTEGER_OVERFLOW";
pub const RECURSION: &str = "RECURSION";
pub const ARRAY: &str = "ARRAY";
pub const STRING: &str = "STRING";
pub const FLOAT: &str = "FLOAT";
pub const CALL: &str = "CALL";

const QUALIFIER: &str = "TagType.";

/// Qualitative behaviour hint attached to a subject. Tags are symbols, not a
/// closed enum: new ones only need to be made known to a [`TagRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagRegistry {
    known: BTreeSet<Tag>,
}

impl TagRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn standard() -> Self {
        [LOOP, INTEGER_OVERFLOW, RECURSION, ARRAY, STRING, FLOAT, CALL]
            .into_iter()
            .fold(Self::empty(), Self::with_tag)
    }

    #[must_use]
    pub fn with_tag(mut self, symbol: &str) -> Self {
        self.known.insert(Tag::new(symbol));
        self
    }

    #[must_use]
    pub fn is_known(&self, symbol: &str) -> bool {
        self.known.iter().any(|tag| tag.as_str() == symbol)
    }

    pub fn known(&self) -> impl Iterator<Item = &Tag> {
        self.known.iter()
    }

    /// Resolves one declared token. `TagType.LOOP` and `LOOP` are the same tag.
    pub fn resolve(&self, token: &str) -> Result<Tag, RegistryError> {
        let trimmed = token.trim();
        let symbol = trimmed.strip_prefix(QUALIFIER).unwrap_or(trimmed);
        if self.is_known(symbol) {
            Ok(Tag::new(symbol))
        } else {
            Err(RegistryError::UnknownTag(trimmed.to_owned()))
        }
    }

    pub fn resolve_all<S: AsRef<str>>(&self, tokens: &[S]) -> Result<BTreeSet<Tag>, RegistryError> {
        tokens
            .iter()
            .map(|token| self.resolve(token.as_ref()))
            .collect()
    }
}
