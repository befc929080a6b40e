// Library root
// -----------
// This crate exposes the catalog core as a library; the binary (`main.rs`)
// drives it through the interactive menus in `ui`.
//
// Module responsibilities:
// - `record`: the vehicle record, its normalization and write validation.
// - `local`: the CSV-file store (load, full rewrite, stale-row checks).
// - `subgroups`: per-make / per-fuel / per-transmission copies of the file.
// - `api`: blocking HTTP client for the remote catalog service.
// - `query`: search, filters, sorting and statistics over loaded records.
// - `session`: the selected data source and the commands run against it.
// - `config` / `error`: environment configuration and the error taxonomy.
// - `ui`: terminal menus; only talks to `session`.
//
// Everything above `ui` is independent of the terminal, so the same core
// can sit behind another front-end.
pub mod api;
pub mod config;
pub mod error;
pub mod local;
pub mod query;
pub mod record;
pub mod session;
pub mod subgroups;
pub mod ui;

pub use error::{CatalogError, Result};
