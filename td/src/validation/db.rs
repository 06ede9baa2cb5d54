//! DB Validator
//!
//! Applies the project's migrations against a throwaway SQLite database and
//! reports the first one that fails. Migrations are plain `.sql` files under
//! a conventional directory, applied in filename order.

use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::json;
use tracing::debug;

use super::{ProjectCapabilities, Validator, ValidatorContext, ValidatorResult};

pub struct DbValidator {
    migrations_relative_dir: PathBuf,
}

impl DbValidator {
    pub const NAME: &'static str = "db";

    pub fn new() -> Self {
        Self {
            migrations_relative_dir: PathBuf::from("migrations"),
        }
    }

    fn migration_files(dir: &std::path::Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "sql"))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl Default for DbValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for DbValidator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn selectable(&self, capabilities: &ProjectCapabilities) -> bool {
        capabilities.has_database
    }

    async fn run(&self, context: &ValidatorContext) -> ValidatorResult {
        let migrations_dir = context.worktree_path.join(&self.migrations_relative_dir);
        let files = match Self::migration_files(&migrations_dir) {
            Ok(files) => files,
            Err(e) => {
                debug!(?migrations_dir, error = %e, "DbValidator::run: no migrations directory");
                return ValidatorResult::skipped(Self::NAME, format!("no migrations at {}: {}", migrations_dir.display(), e));
            }
        };

        if files.is_empty() {
            return ValidatorResult::skipped(Self::NAME, "migrations directory is empty");
        }

        let conn = match Connection::open_in_memory() {
            Ok(conn) => conn,
            Err(e) => return ValidatorResult::skipped(Self::NAME, format!("failed to open throwaway db: {}", e)),
        };

        for file in &files {
            let sql = match std::fs::read_to_string(file) {
                Ok(sql) => sql,
                Err(e) => {
                    return ValidatorResult::fail(Self::NAME, format!("failed to read {}: {}", file.display(), e));
                }
            };

            if let Err(e) = conn.execute_batch(&sql) {
                return ValidatorResult::fail(Self::NAME, format!("migration {} failed", file.display()))
                    .with_details(json!({ "migration": file.display().to_string(), "error": e.to_string() }));
            }
        }

        ValidatorResult::pass(Self::NAME, format!("{} migration(s) applied cleanly", files.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_migrations_dir_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("migrations")).unwrap();
        let validator = DbValidator::new();
        let ctx = ValidatorContext::new("001-example", temp.path(), temp.path());
        let result = validator.run(&ctx).await;
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn bad_migration_fails_with_its_name() {
        let temp = tempfile::tempdir().unwrap();
        let migrations = temp.path().join("migrations");
        std::fs::create_dir_all(&migrations).unwrap();
        std::fs::write(migrations.join("001_init.sql"), "CREATE TABLE users (id INTEGER PRIMARY KEY);").unwrap();
        std::fs::write(migrations.join("002_bad.sql"), "NOT VALID SQL;").unwrap();

        let validator = DbValidator::new();
        let ctx = ValidatorContext::new("001-example", temp.path(), temp.path());
        let result = validator.run(&ctx).await;
        assert!(!result.passed);
        assert!(result.details["migration"].as_str().unwrap().contains("002_bad.sql"));
    }
}
