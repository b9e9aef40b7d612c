//! `tutorbot records`: inspect collected record sets.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use tutorbot::config::Config;
use tutorbot::store::{FileRecordStore, RecordDir, RecordKey, RecordStore, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

/// Kind of record set, one per data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    Attendance,
    ExerciseFeedback,
    TutorSessionFeedback,
}

impl From<RecordKind> for RecordDir {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Attendance => RecordDir::Attendance,
            RecordKind::ExerciseFeedback => RecordDir::ExerciseFeedback,
            RecordKind::TutorSessionFeedback => RecordDir::TutorSessionFeedback,
        }
    }
}

async fn open_store(config_path: &str) -> Result<FileRecordStore> {
    let config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load {config_path}"))?;
    Ok(FileRecordStore::new(config.data_dir(Path::new(config_path))))
}

pub async fn list(config_path: &str, kind: RecordKind) -> Result<()> {
    let store = open_store(config_path).await?;
    let names = store.list(kind.into()).await?;

    if names.is_empty() {
        println!("No {} records.", RecordDir::from(kind));
        return Ok(());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

pub async fn show(config_path: &str, kind: RecordKind, name: &str, format: Format) -> Result<()> {
    let key = record_key(kind, name)?;
    let store = open_store(config_path).await?;
    let table = store.read_table(&key).await?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&TableView::from(&table))?),
        Format::Text => print!("{}", render_text(&table)),
    }
    Ok(())
}

/// Key for a name as printed by `records list`, with or without `.csv`.
fn record_key(kind: RecordKind, name: &str) -> Result<RecordKey> {
    let stem = name.strip_suffix(".csv").unwrap_or(name);
    RecordKey::existing(kind.into(), stem)
        .with_context(|| format!("'{name}' is not a record set name"))
}

#[derive(Debug, Serialize)]
struct TableView<'a> {
    header: &'a [String],
    rows: &'a [Vec<String>],
}

impl<'a> From<&'a Table> for TableView<'a> {
    fn from(table: &'a Table) -> Self {
        Self {
            header: &table.header,
            rows: &table.rows,
        }
    }
}

/// Left-aligned columns, padded to the widest cell.
fn render_text(table: &Table) -> String {
    let mut widths: Vec<usize> = table.header.iter().map(|h| h.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c:<width$}", width = widths.get(i).copied().unwrap_or(0)))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(&table.header);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(&rule));
    for row in &table.rows {
        out.push_str(&line(row));
    }
    out
}
