use spycat_core::db::migrations::latest_version;
use spycat_core::db::{open_db, open_db_in_memory, Database, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "cats");
    assert_table_exists(&conn, "missions");
    assert_table_exists(&conn, "targets");
    assert_index_exists(&conn, "idx_missions_active_assignee");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spycat.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "missions");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn active_assignee_index_rejects_second_active_mission_for_same_cat() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO cats (name, breed, years_of_experience, salary)
         VALUES ('Tom', 'Bengal', 3, 100);
         INSERT INTO missions (assignee, completed) VALUES (1, 0);
         INSERT INTO missions (assignee, completed) VALUES (1, 1);",
    )
    .unwrap();

    let err = conn
        .execute("INSERT INTO missions (assignee, completed) VALUES (1, 0);", [])
        .unwrap_err();
    assert_eq!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    );
}

#[test]
fn deleting_mission_cascades_to_targets() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO missions (completed) VALUES (0);
         INSERT INTO targets (mission_id, name, country) VALUES (1, 'Mouse', 'FR');",
    )
    .unwrap();

    conn.execute("DELETE FROM missions WHERE id = 1;", []).unwrap();
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM targets;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn pooled_database_shares_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("pool.db"), 3).unwrap();
    assert_eq!(db.pool_size(), 3);
    assert!(matches!(
        Database::open(dir.path().join("empty.db"), 0),
        Err(DbError::InvalidPoolSize(0))
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_schema_object(conn, "table", table_name);
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert_schema_object(conn, "index", index_name);
}

fn assert_schema_object(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
