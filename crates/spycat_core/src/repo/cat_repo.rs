//! Cat repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD primitives over the `cats` table.
//!
//! # Invariants
//! - Non-negative experience and salary are also enforced by table CHECKs.
//! - `delete_cat` clears `assignee` on completed missions through the
//!   `ON DELETE SET NULL` foreign key; active-assignment guarding is the
//!   caller's job.

use super::mappers::{parse_cat_row, CAT_COLUMNS};
use super::RepoResult;
use crate::model::cat::{Cat, CatId, NewCat};
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for cat persistence.
pub trait CatRepository {
    fn list_cats(&self) -> RepoResult<Vec<Cat>>;
    fn create_cat(&self, cat: &NewCat) -> RepoResult<Cat>;
    fn get_cat(&self, id: CatId) -> RepoResult<Option<Cat>>;
    /// Returns `None` when no cat has `id`.
    fn update_cat_salary(&self, id: CatId, salary: i32) -> RepoResult<Option<Cat>>;
    /// Returns the number of deleted rows.
    fn delete_cat(&self, id: CatId) -> RepoResult<usize>;
}

/// SQLite-backed cat repository.
pub struct SqliteCatRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CatRepository for SqliteCatRepository<'_> {
    fn list_cats(&self) -> RepoResult<Vec<Cat>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CAT_COLUMNS} FROM cats ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut cats = Vec::new();
        while let Some(row) = rows.next()? {
            cats.push(parse_cat_row(row)?);
        }
        Ok(cats)
    }

    fn create_cat(&self, cat: &NewCat) -> RepoResult<Cat> {
        let mut stmt = self.conn.prepare(&format!(
            "INSERT INTO cats (name, breed, years_of_experience, salary)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING {CAT_COLUMNS};"
        ))?;
        let mut rows = stmt.query(params![
            cat.name.as_str(),
            cat.breed.as_str(),
            cat.years_of_experience,
            cat.salary,
        ])?;
        match rows.next()? {
            Some(row) => parse_cat_row(row),
            None => Err(rusqlite::Error::QueryReturnedNoRows.into()),
        }
    }

    fn get_cat(&self, id: CatId) -> RepoResult<Option<Cat>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CAT_COLUMNS} FROM cats WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_cat_row(row)?)),
            None => Ok(None),
        }
    }

    fn update_cat_salary(&self, id: CatId, salary: i32) -> RepoResult<Option<Cat>> {
        let mut stmt = self.conn.prepare(&format!(
            "UPDATE cats
             SET
                salary = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
             RETURNING {CAT_COLUMNS};"
        ))?;
        let mut rows = stmt.query(params![id, salary])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_cat_row(row)?)),
            None => Ok(None),
        }
    }

    fn delete_cat(&self, id: CatId) -> RepoResult<usize> {
        let changed = self.conn.execute("DELETE FROM cats WHERE id = ?1;", [id])?;
        Ok(changed)
    }
}

/// Whether a cat exists, without loading it.
pub fn cat_exists(conn: &Connection, id: CatId) -> RepoResult<bool> {
    let found = conn
        .query_row("SELECT 1 FROM cats WHERE id = ?1;", [id], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}
