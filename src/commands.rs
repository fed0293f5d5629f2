use crate::OutputMode;
use entity_manager::config::{self, ManagerConfig};
use entity_manager::ui::{self, header, info, section, stats_table, success, warn, Icons};
use entity_manager::SqliteStore;
use std::path::Path;
use tabled::Tabled;

const UNVERSIONED: &str = "unversioned";

#[derive(Tabled, serde::Serialize)]
struct VersionRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Version")]
    version: i64,
    #[tabled(rename = "Rows")]
    rows: usize,
}

#[derive(Tabled, serde::Serialize)]
struct TableRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Columns")]
    columns: String,
}

fn emit_json<T: serde::Serialize>(command: &str, data: &T) -> anyhow::Result<()> {
    let out = serde_json::json!({
        "command": command,
        "data": data,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

pub fn run_init(path: &Path, config: &ManagerConfig, force: bool) -> anyhow::Result<()> {
    config::write_config(path, config, force)?;
    if let Some(db) = &config.database {
        config::ensure_db_dir(db)?;
    }
    success(&format!("Wrote {}", path.display()));
    if let Some(db) = &config.database {
        info("Database", &db.display().to_string());
    }
    Ok(())
}

pub fn run_versions(store: &SqliteStore, mode: OutputMode) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for record in store.versions()? {
        let count = if store.table_exists(&record.entity)? {
            store.count_rows(&record.entity)?
        } else {
            warn(&format!("Version record for missing table {}", record.entity));
            0
        };
        rows.push(VersionRow {
            entity: record.entity,
            version: record.version,
            rows: count,
        });
    }

    if !mode.is_human() {
        return emit_json("versions", &rows);
    }

    header(Icons::TAG, "Schema versions");
    if rows.is_empty() {
        println!("∅ No version records found.");
    } else {
        println!("{}", ui::render(&rows));
    }
    Ok(())
}

pub fn run_tables(store: &SqliteStore, mode: OutputMode) -> anyhow::Result<()> {
    let versions = store.versions()?;
    let mut rows = Vec::new();
    for table in store.user_tables()? {
        let version = versions
            .iter()
            .find(|r| r.entity == table)
            .map(|r| format!("v{}", r.version))
            .unwrap_or_else(|| UNVERSIONED.to_string());
        rows.push(TableRow {
            columns: store.table_columns(&table)?.join(", "),
            version,
            table,
        });
    }

    if !mode.is_human() {
        return emit_json("tables", &rows);
    }

    header(Icons::TABLE, "Tables");
    if rows.is_empty() {
        println!("∅ No tables found.");
    } else {
        for row in rows.iter_mut().filter(|r| r.version == UNVERSIONED) {
            row.version = ui::dim(UNVERSIONED);
        }
        println!("{}", ui::render(&rows));
    }
    Ok(())
}

pub fn run_stats(store: &SqliteStore, mode: OutputMode) -> anyhow::Result<()> {
    let stats = store.stats()?;
    if !mode.is_human() {
        return emit_json("stats", &stats);
    }

    let location = store
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(in memory)".to_string());
    header(Icons::STATS, "Store statistics");
    info("Database", &location);

    let tables = stats.tables.len().to_string();
    let versioned = stats
        .tables
        .iter()
        .filter(|t| t.version.is_some())
        .count()
        .to_string();
    let total = stats.total_rows().to_string();
    println!(
        "{}",
        stats_table(&[
            ("Tables", &tables),
            ("Versioned tables", &versioned),
            ("Total rows", &total),
        ])
    );

    if !stats.tables.is_empty() {
        section("Per table");
        for table in &stats.tables {
            ui::summary_row(&table.name, &format!("{} rows, {} columns", table.rows, table.columns));
        }
    }
    Ok(())
}
