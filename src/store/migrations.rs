//! Versioned schema migrations.
//!
//! The schema evolves through steps keyed by *source* version, stored in
//! `PRAGMA user_version`. Steps form a tree rather than a straight line:
//! two historical branches may target the same next version, so databases
//! created on either branch converge on one canonical terminal schema.
//! Target tags are random-looking on purpose — picking fresh numbers avoids
//! collisions when branches add steps independently.
//!
//! The whole walk from the persisted version to [`TERMINAL_VERSION`] runs
//! inside a single transaction: either every step lands or the database is
//! left untouched. Statements use existence-checked DDL so a step is safe
//! to re-apply.

use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;

/// The canonical terminal schema version. A database at this version has
/// no outgoing step and is ready to serve.
pub const TERMINAL_VERSION: i64 = 83_095_014;

/// One edge in the migration graph: apply `statements`, then stamp `target`.
struct MigrationStep {
    source: i64,
    target: i64,
    name: &'static str,
    statements: &'static str,
}

const CREATE_EXERCISES: &str = "
    CREATE TABLE IF NOT EXISTS exercises (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        data TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_exercises_owner ON exercises(owner);
";

const STEPS: &[MigrationStep] = &[
    MigrationStep {
        source: 0,
        target: 10_250_839,
        name: "accounts",
        statements: "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token_hash TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
        ",
    },
    MigrationStep {
        source: 10_250_839,
        target: 98_198_766,
        name: "exercises",
        statements: CREATE_EXERCISES,
    },
    MigrationStep {
        source: 98_198_766,
        target: 61_077_540,
        name: "archive",
        statements: "
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                original_name TEXT NOT NULL,
                stored_name TEXT NOT NULL UNIQUE,
                size_bytes INTEGER NOT NULL,
                uploaded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner);
        ",
    },
    // Databases from the retired files-first branch already have the files
    // table; adding exercises brings them to the same schema as the trunk.
    MigrationStep {
        source: 39_400_698,
        target: 61_077_540,
        name: "exercises (files-first branch)",
        statements: CREATE_EXERCISES,
    },
    MigrationStep {
        source: 61_077_540,
        target: 83_095_014,
        name: "notes",
        statements: "
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner);
        ",
    },
];

/// Why a migration run refused to proceed. Any variant aborts startup.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The persisted version matches no step and is not terminal. Running
    /// against a database from an unrecognized build would corrupt it.
    #[error("unknown schema version {0}; refusing to start against this database")]
    UnknownVersion(i64),
    /// More steps walked than declared — the step graph loops.
    #[error("schema migration graph does not terminate (looped at version {0})")]
    Cycle(i64),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Bring the database to [`TERMINAL_VERSION`]. Idempotent; safe to call on
/// every process start. Returns the number of steps applied.
pub fn migrate(conn: &mut Connection) -> Result<usize, MigrationError> {
    run(conn, STEPS, TERMINAL_VERSION)
}

/// Current persisted schema version (zero for a fresh database).
pub fn schema_version(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

fn run(
    conn: &mut Connection,
    steps: &[MigrationStep],
    terminal: i64,
) -> Result<usize, MigrationError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut applied = 0usize;

    loop {
        let version = schema_version(&tx)?;
        if version == terminal {
            break;
        }
        let step = steps
            .iter()
            .find(|step| step.source == version)
            .ok_or(MigrationError::UnknownVersion(version))?;
        // A valid tree never revisits a source, so walking more steps than
        // the table holds means the graph loops.
        if applied == steps.len() {
            return Err(MigrationError::Cycle(version));
        }
        tx.execute_batch(step.statements)?;
        tx.pragma_update(None, "user_version", step.target)?;
        tracing::info!(
            name = step.name,
            from = step.source,
            to = step.target,
            "applied schema migration step"
        );
        applied += 1;
    }

    tx.commit()?;
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    fn index_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'index' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn fresh_database_reaches_terminal_version() {
        let mut conn = fresh_conn();
        let applied = migrate(&mut conn).unwrap();
        assert_eq!(applied, 4);
        assert_eq!(schema_version(&conn).unwrap(), TERMINAL_VERSION);

        let tables = table_names(&conn);
        for expected in ["users", "sessions", "exercises", "files", "notes"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn second_run_applies_zero_steps() {
        let mut conn = fresh_conn();
        migrate(&mut conn).unwrap();
        let applied = migrate(&mut conn).unwrap();
        assert_eq!(applied, 0);
        assert_eq!(schema_version(&conn).unwrap(), TERMINAL_VERSION);
    }

    #[test]
    fn every_declared_source_reaches_terminal() {
        for step in STEPS {
            let mut conn = fresh_conn();
            conn.pragma_update(None, "user_version", step.source)
                .unwrap();
            migrate(&mut conn).unwrap();
            assert_eq!(
                schema_version(&conn).unwrap(),
                TERMINAL_VERSION,
                "walk from {} did not terminate",
                step.source
            );
        }
    }

    #[test]
    fn branches_converge_on_identical_schema() {
        // Trunk: straight walk from a fresh database.
        let mut trunk = fresh_conn();
        migrate(&mut trunk).unwrap();

        // A database left behind by the files-first branch: accounts and
        // files exist, exercises never landed.
        let mut branch = fresh_conn();
        branch.execute_batch(STEPS[0].statements).unwrap();
        branch.execute_batch(STEPS[2].statements).unwrap();
        branch.pragma_update(None, "user_version", 39_400_698).unwrap();
        migrate(&mut branch).unwrap();

        assert_eq!(schema_version(&branch).unwrap(), TERMINAL_VERSION);
        assert_eq!(table_names(&trunk), table_names(&branch));
        assert_eq!(index_names(&trunk), index_names(&branch));
    }

    #[test]
    fn unknown_version_refuses_to_run() {
        let mut conn = fresh_conn();
        conn.pragma_update(None, "user_version", 4242).unwrap();

        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion(4242)));
        // Nothing was stamped or created.
        assert_eq!(schema_version(&conn).unwrap(), 4242);
        assert!(table_names(&conn).is_empty());
    }

    #[test]
    fn failing_statement_rolls_back_the_whole_run() {
        let steps = [
            MigrationStep {
                source: 0,
                target: 10,
                name: "ok",
                statements: "CREATE TABLE IF NOT EXISTS alpha (id INTEGER PRIMARY KEY);",
            },
            MigrationStep {
                source: 10,
                target: 20,
                name: "broken",
                statements: "CREATE TABLE IF NOT EXISTS beta (id INTEGER PRIMARY KEY);
                             CREATE INDEX idx_broken ON no_such_table(col);",
            },
        ];

        let mut conn = fresh_conn();
        let err = run(&mut conn, &steps, 20).unwrap_err();
        assert!(matches!(err, MigrationError::Sqlite(_)));

        // The first step committed nothing either: version and schema are
        // exactly as before the run.
        assert_eq!(schema_version(&conn).unwrap(), 0);
        assert!(table_names(&conn).is_empty());
    }

    #[test]
    fn cyclic_graph_is_detected() {
        let steps = [
            MigrationStep {
                source: 0,
                target: 10,
                name: "forward",
                statements: "CREATE TABLE IF NOT EXISTS alpha (id INTEGER PRIMARY KEY);",
            },
            MigrationStep {
                source: 10,
                target: 0,
                name: "back",
                statements: "CREATE TABLE IF NOT EXISTS beta (id INTEGER PRIMARY KEY);",
            },
        ];

        let mut conn = fresh_conn();
        let err = run(&mut conn, &steps, 99).unwrap_err();
        assert!(matches!(err, MigrationError::Cycle(_)));
        assert_eq!(schema_version(&conn).unwrap(), 0);
    }
}
