//! Caller roles and the boards they may post to.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Caller role as resolved by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Manager,
    Admin,
}

impl Role {
    /// Parse a role name. Unknown or empty names fall back to `Student`, the most
    /// restrictive tier.
    pub fn parse(s: &str) -> Role {
        match s.trim().to_lowercase().as_str() {
            "teacher" => Role::Teacher,
            "manager" => Role::Manager,
            "admin" => Role::Admin,
            _ => Role::Student,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    /// Roles that may manage any attachment regardless of authorship.
    pub fn is_moderator(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Board a post (and therefore its attachments) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    Free,
    Education,
    Notice,
}

impl BoardKind {
    pub fn parse(s: &str) -> Option<BoardKind> {
        match s.trim().to_lowercase().as_str() {
            "free" => Some(BoardKind::Free),
            "education" => Some(BoardKind::Education),
            "notice" => Some(BoardKind::Notice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoardKind::Free => "free",
            BoardKind::Education => "education",
            BoardKind::Notice => "notice",
        }
    }
}

impl Display for BoardKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_role_is_student() {
        assert_eq!(Role::parse("guest"), Role::Student);
        assert_eq!(Role::parse(""), Role::Student);
        assert_eq!(Role::parse(" Admin "), Role::Admin);
    }

    #[test]
    fn test_board_parse() {
        assert_eq!(BoardKind::parse("Notice"), Some(BoardKind::Notice));
        assert_eq!(BoardKind::parse("gallery"), None);
    }
}
