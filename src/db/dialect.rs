//! Static per-engine SQL phrasing rules injected into generation prompts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Relational engine kind governing SQL phrasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Postgresql,
    Mysql,
    Sqlite,
}

impl EngineKind {
    /// Detect the engine from a connection-string scheme.
    pub fn from_connection_string(url: &str) -> Option<Self> {
        let scheme = url.split("://").next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(EngineKind::Postgresql),
            "mysql" | "mariadb" => Some(EngineKind::Mysql),
            "sqlite" => Some(EngineKind::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Postgresql => "postgresql",
            EngineKind::Mysql => "mysql",
            EngineKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dialect-specific phrasing for generated SQL.
#[derive(Debug, Clone, Copy)]
pub struct DialectRules {
    pub name: &'static str,
    pub case_insensitive_like: &'static str,
    pub boolean_true: &'static str,
    pub boolean_false: &'static str,
    pub date_now: &'static str,
    pub limit_syntax: &'static str,
    pub notes: &'static str,
}

/// Rules for an engine. The table is total over [`EngineKind`].
pub fn dialect_rules(engine: EngineKind) -> &'static DialectRules {
    match engine {
        EngineKind::Postgresql => &DialectRules {
            name: "PostgreSQL",
            case_insensitive_like: "ILIKE",
            boolean_true: "TRUE",
            boolean_false: "FALSE",
            date_now: "NOW()",
            limit_syntax: "LIMIT {limit} OFFSET {offset}",
            notes: "Use ILIKE for case-insensitive text search",
        },
        EngineKind::Mysql => &DialectRules {
            name: "MySQL",
            case_insensitive_like: "LIKE",
            boolean_true: "1",
            boolean_false: "0",
            date_now: "NOW()",
            limit_syntax: "LIMIT {offset}, {limit}",
            notes: "LIMIT offset, limit syntax",
        },
        EngineKind::Sqlite => &DialectRules {
            name: "SQLite",
            case_insensitive_like: "LIKE",
            boolean_true: "1",
            boolean_false: "0",
            date_now: "CURRENT_TIMESTAMP",
            limit_syntax: "LIMIT {limit} OFFSET {offset}",
            notes: "Limited ALTER TABLE support",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_detected_from_url_scheme() {
        assert_eq!(
            EngineKind::from_connection_string("postgres://u:p@host/db"),
            Some(EngineKind::Postgresql)
        );
        assert_eq!(
            EngineKind::from_connection_string("postgresql://host/db"),
            Some(EngineKind::Postgresql)
        );
        assert_eq!(
            EngineKind::from_connection_string("mysql://host/db"),
            Some(EngineKind::Mysql)
        );
        assert_eq!(
            EngineKind::from_connection_string("sqlite:///tmp/x.db"),
            Some(EngineKind::Sqlite)
        );
        assert_eq!(EngineKind::from_connection_string("redis://host"), None);
        assert_eq!(EngineKind::from_connection_string("not a url"), None);
    }

    #[test]
    fn dialect_table_is_engine_specific() {
        assert_eq!(dialect_rules(EngineKind::Postgresql).case_insensitive_like, "ILIKE");
        assert_eq!(dialect_rules(EngineKind::Mysql).boolean_true, "1");
        assert_eq!(dialect_rules(EngineKind::Sqlite).date_now, "CURRENT_TIMESTAMP");
    }

    #[test]
    fn engine_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EngineKind::Postgresql).unwrap(),
            "\"postgresql\""
        );
    }
}
