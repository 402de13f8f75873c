//! Study material domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category of an uploaded study material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Note,
    QuestionPaper,
    Syllabus,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown material type: {0}")]
pub struct UnknownMaterialKind(pub String);

impl MaterialKind {
    pub const ALL: [MaterialKind; 4] = [
        Self::Note,
        Self::QuestionPaper,
        Self::Syllabus,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::QuestionPaper => "question_paper",
            Self::Syllabus => "syllabus",
            Self::Other => "other",
        }
    }
}

impl Default for MaterialKind {
    fn default() -> Self {
        Self::Note
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterialKind {
    type Err = UnknownMaterialKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownMaterialKind(s.to_owned()))
    }
}
