use anyhow::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let conn = Database::connect(database_url).await?;
    Ok(conn)
}

/// Execute the SQL files in `migrations/` in filename order.
///
/// Every migration is written with `IF NOT EXISTS` guards, so running the
/// whole directory again on startup is a no-op for an up-to-date schema.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    run_migrations_from(conn, Path::new("migrations")).await
}

pub async fn run_migrations_from(conn: &DatabaseConnection, dir: &Path) -> Result<()> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    let backend = conn.get_database_backend();
    for file in files {
        let sql = fs::read_to_string(&file).await?;
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in split_statements(&sql) {
            conn.execute(Statement::from_string(backend, stmt)).await?;
        }
        tracing::debug!(file = %file.display(), "migration applied");
    }

    Ok(())
}

fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|stmt| {
            stmt.lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|stmt| stmt.trim().to_string())
        .filter(|stmt| !stmt.is_empty())
        .map(|stmt| format!("{stmt};"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::split_statements;

    #[test]
    fn splits_and_drops_comment_only_chunks() {
        let sql = "-- users\nCREATE TABLE a (id int);\n\n-- trailing comment\n";
        let stmts = split_statements(sql);
        assert_eq!(stmts, vec!["CREATE TABLE a (id int);".to_string()]);
    }
}
