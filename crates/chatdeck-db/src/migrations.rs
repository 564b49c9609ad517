//! Embedded SQL migrations.
//!
//! Each file under `migrations/` is compiled in and applied at most once,
//! recorded by name in `_chatdeck_migrations`.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// Ordered list of schema migrations. Append only.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_chatbots",
        sql: include_str!("migrations/001_chatbots.sql"),
    },
    Migration {
        name: "002_conversations",
        sql: include_str!("migrations/002_conversations.sql"),
    },
    Migration {
        name: "003_messages",
        sql: include_str!("migrations/003_messages.sql"),
    },
];

/// Errors raised while bringing the schema up to date.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    #[error("failed to read migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every pending migration and returns how many ran.
///
/// # Errors
///
/// Returns `MigrationError` if a migration fails or the tracking table
/// cannot be read. A failed migration is rolled back in full.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _chatdeck_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|source| MigrationError::ExecutionFailed {
        name: "bootstrap".to_string(),
        source,
    })?;

    let mut count = 0;
    for migration in migrations {
        let seen = conn
            .query_row(
                "SELECT 1 FROM _chatdeck_migrations WHERE name = ?1",
                [migration.name],
                |_| Ok(()),
            )
            .optional()
            .map_err(MigrationError::StateQuery)?
            .is_some();
        if seen {
            continue;
        }

        let failed = |source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT OR IGNORE INTO _chatdeck_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        tracing::info!(migration = migration.name, "applied migration");
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn applies_all_then_nothing() {
        let conn = open();
        assert_eq!(run_migrations(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(run_migrations(&conn).unwrap(), 0);

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM _chatdeck_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(recorded as usize, MIGRATIONS.len());
    }

    #[test]
    fn broken_migration_rolls_back() {
        let conn = open();
        let broken = [
            Migration {
                name: "900_ok",
                sql: "CREATE TABLE scratch (id INTEGER);",
            },
            Migration {
                name: "901_broken",
                sql: "CREATE TABLE half (id INTEGER); NOT VALID SQL;",
            },
        ];

        let err = apply(&conn, &broken).unwrap_err();
        match err {
            MigrationError::ExecutionFailed { name, .. } => assert_eq!(name, "901_broken"),
            other => panic!("unexpected error: {other}"),
        }

        let half: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'half'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(half, 0, "partial migration must not persist");

        assert_eq!(apply(&conn, &broken[..1]).unwrap(), 0);
    }

    #[test]
    fn deleting_chatbot_cascades() {
        let conn = open();
        run_migrations(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO chatbots (id, name, system_prompt, provider, model, created_at, updated_at)
                VALUES ('b1', 'Bot', '', 'groq', 'llama-3.3-70b-versatile', 't', 't');
             INSERT INTO conversations (id, chatbot_id, created_at, updated_at)
                VALUES ('c1', 'b1', 't', 't');
             INSERT INTO messages (id, conversation_id, seq, role, content, created_at)
                VALUES ('m1', 'c1', 1, 'user', 'hi', 't');",
        )
        .unwrap();

        conn.execute("DELETE FROM chatbots WHERE id = 'b1'", []).unwrap();

        let left: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM conversations) + (SELECT COUNT(*) FROM messages)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(left, 0);
    }
}
