// Session context: which store backs the current interaction, plus the
// working collection cached for local listings. All catalog operations go
// through a `Session`, so nothing can run before a source is selected.

use tracing::{debug, info};

use crate::api::{ApiClient, ListQuery};
use crate::error::{CatalogError, Result};
use crate::local::{Loaded, LocalStore};
use crate::query::{self, Direction, Statistics};
use crate::record::{fold, Field, RecordId, Vehicle, VehiclePatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Local,
    Remote,
}

#[derive(Debug, Default)]
enum Source {
    #[default]
    Unselected,
    Local(LocalStore),
    Remote(ApiClient),
}

/// How a listed record is addressed when it is later edited or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Position in the local working collection.
    Row(usize),
    /// Identifier assigned by the remote service.
    Id(RecordId),
}

/// A record picked from a listing, ready to be edited or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub vehicle: Vehicle,
    pub locator: Locator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    FuelType(String),
    Transmission(String),
    YearRange { min: i32, max: i32 },
}

/// Requests the presentation layer can issue.
#[derive(Debug)]
pub enum Command {
    SelectLocal(LocalStore),
    SelectRemote(ApiClient),
    List,
    Search(String),
    Filter(Filter),
    Sort(Field, Direction),
    Stats,
    /// Records matching a text, addressable for edit and delete.
    Candidates(String),
    FindByModel(String),
    Add(Vehicle),
    Edit(Selection, VehiclePatch),
    Delete(Selection),
}

/// Result of a [`Command`], ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Selected(SourceKind),
    Records(Loaded),
    Statistics(Statistics),
    Candidates(Vec<Selection>),
    Found(Option<Selection>),
    Saved(Vehicle),
    Deleted(Vehicle),
}

#[derive(Debug, Default)]
pub struct Session {
    source: Source,
    cache: Option<Loaded>,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn kind(&self) -> Option<SourceKind> {
        match self.source {
            Source::Unselected => None,
            Source::Local(_) => Some(SourceKind::Local),
            Source::Remote(_) => Some(SourceKind::Remote),
        }
    }

    /// Back the session with a local file. Always succeeds; the file is
    /// created on first load if it does not exist.
    pub fn select_local(&mut self, store: LocalStore) {
        info!(path = %store.path().display(), "using local catalog");
        self.cache = None;
        self.source = Source::Local(store);
    }

    /// Back the session with the remote service, provided it answers the
    /// health check. On failure the session is left unselected.
    pub fn select_remote(&mut self, client: ApiClient) -> Result<()> {
        self.cache = None;
        if !client.check_availability() {
            self.source = Source::Unselected;
            return Err(CatalogError::Unavailable(format!(
                "{} did not answer the health check",
                client.base_url()
            )));
        }
        info!(url = client.base_url(), "using remote catalog");
        self.source = Source::Remote(client);
        Ok(())
    }

    /// Forget the selected source and any cached records.
    pub fn reset(&mut self) {
        self.source = Source::Unselected;
        self.cache = None;
    }

    /// Drop the cached local collection so the next listing re-reads the file.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn list(&mut self) -> Result<Loaded> {
        self.fetch(&ListQuery::default())
    }

    pub fn search(&mut self, text: &str) -> Result<Loaded> {
        let loaded = self.fetch(&ListQuery::text(text))?;
        Ok(narrow(loaded, |records| query::search(records, text)))
    }

    pub fn filter(&mut self, filter: &Filter) -> Result<Loaded> {
        let remote_query = match filter {
            Filter::FuelType(fuel) => ListQuery {
                fuel_type: Some(fuel.clone()),
                ..ListQuery::default()
            },
            _ => ListQuery::default(),
        };
        let loaded = self.fetch(&remote_query)?;
        Ok(narrow(loaded, |records| match filter {
            Filter::FuelType(fuel) => query::filter_by_fuel_type(records, fuel),
            Filter::Transmission(t) => query::filter_by_transmission(records, t),
            Filter::YearRange { min, max } => query::filter_by_year_range(records, *min, *max),
        }))
    }

    pub fn sort(&mut self, field: Field, direction: Direction) -> Result<Loaded> {
        let loaded = self.fetch(&ListQuery {
            sort: Some((field, direction)),
            ..ListQuery::default()
        })?;
        Ok(narrow(loaded, |records| query::sort_by(records, field, direction)))
    }

    pub fn statistics(&mut self) -> Result<Statistics> {
        let loaded = self.list()?;
        Ok(query::statistics(&loaded.records))
    }

    /// Records matching `text`, each with the locator needed to edit or
    /// delete it afterwards.
    pub fn candidates(&mut self, text: &str) -> Result<Vec<Selection>> {
        let loaded = self.fetch(&ListQuery::text(text))?;
        let matches = |v: &Vehicle| query::matches_text(v, text);
        let selections = match self.source {
            Source::Local(_) => loaded
                .records
                .into_iter()
                .enumerate()
                .filter(|(_, v)| matches(v))
                .map(|(i, vehicle)| Selection {
                    vehicle,
                    locator: Locator::Row(i),
                })
                .collect(),
            _ => loaded
                .records
                .into_iter()
                .filter(|v| matches(v))
                .filter_map(|vehicle| {
                    let id = vehicle.id.clone()?;
                    Some(Selection {
                        vehicle,
                        locator: Locator::Id(id),
                    })
                })
                .collect(),
        };
        Ok(selections)
    }

    /// The record whose model equals `model` ignoring case and accents,
    /// else the first record matching it as a search.
    pub fn find_by_model(&mut self, model: &str) -> Result<Option<Selection>> {
        if model.trim().is_empty() {
            return Ok(None);
        }
        if let Source::Remote(client) = &self.source {
            let found = client.find_by_model(model);
            return Ok(self.guard(found)?.and_then(|vehicle| {
                let id = vehicle.id.clone()?;
                Some(Selection {
                    vehicle,
                    locator: Locator::Id(id),
                })
            }));
        }
        let wanted = fold(model);
        let mut candidates = self.candidates(model)?;
        let exact = candidates
            .iter()
            .position(|s| fold(&s.vehicle.model) == wanted);
        Ok(match exact {
            Some(i) => Some(candidates.swap_remove(i)),
            None => candidates.into_iter().next(),
        })
    }

    pub fn add(&mut self, vehicle: &Vehicle) -> Result<Vehicle> {
        let result = match &mut self.source {
            Source::Unselected => Err(CatalogError::NoSource),
            Source::Local(store) => store.append(vehicle).map(|(saved, records)| {
                self.cache = Some(Loaded { records, skipped: 0 });
                saved
            }),
            Source::Remote(client) => client.create(vehicle),
        };
        self.guard(result)
    }

    pub fn edit(&mut self, selection: &Selection, patch: &VehiclePatch) -> Result<Vehicle> {
        let result = match (&mut self.source, &selection.locator) {
            (Source::Unselected, _) => Err(CatalogError::NoSource),
            (Source::Local(store), Locator::Row(index)) => store
                .update(*index, &selection.vehicle, patch)
                .map(|(updated, records)| {
                    self.cache = Some(Loaded { records, skipped: 0 });
                    updated
                }),
            (Source::Remote(client), Locator::Id(id)) => client.update_partial(id, patch),
            _ => Err(stale_selection()),
        };
        self.guard(result)
    }

    pub fn delete(&mut self, selection: &Selection) -> Result<Vehicle> {
        let result = match (&mut self.source, &selection.locator) {
            (Source::Unselected, _) => Err(CatalogError::NoSource),
            (Source::Local(store), Locator::Row(index)) => {
                store
                    .remove(*index, &selection.vehicle)
                    .map(|(removed, records)| {
                        self.cache = Some(Loaded { records, skipped: 0 });
                        removed
                    })
            }
            (Source::Remote(client), Locator::Id(id)) => client
                .delete(id)
                .map(|()| selection.vehicle.clone()),
            _ => Err(stale_selection()),
        };
        self.guard(result)
    }

    /// Dispatch one presentation-layer request.
    pub fn execute(&mut self, command: Command) -> Result<Outcome> {
        debug!(?command, "executing");
        Ok(match command {
            Command::SelectLocal(store) => {
                self.select_local(store);
                Outcome::Selected(SourceKind::Local)
            }
            Command::SelectRemote(client) => {
                self.select_remote(client)?;
                Outcome::Selected(SourceKind::Remote)
            }
            Command::List => Outcome::Records(self.list()?),
            Command::Search(text) => Outcome::Records(self.search(&text)?),
            Command::Filter(filter) => Outcome::Records(self.filter(&filter)?),
            Command::Sort(field, direction) => Outcome::Records(self.sort(field, direction)?),
            Command::Stats => Outcome::Statistics(self.statistics()?),
            Command::Candidates(text) => Outcome::Candidates(self.candidates(&text)?),
            Command::FindByModel(model) => Outcome::Found(self.find_by_model(&model)?),
            Command::Add(vehicle) => Outcome::Saved(self.add(&vehicle)?),
            Command::Edit(selection, patch) => Outcome::Saved(self.edit(&selection, &patch)?),
            Command::Delete(selection) => Outcome::Deleted(self.delete(&selection)?),
        })
    }

    // Local: the cached working collection (loaded once per session).
    // Remote: a fresh request every time, with `query` passed through.
    fn fetch(&mut self, remote_query: &ListQuery) -> Result<Loaded> {
        let result = match &mut self.source {
            Source::Unselected => Err(CatalogError::NoSource),
            Source::Local(store) => match self.cache.clone() {
                Some(cached) => Ok(cached),
                None => store.load_all().map(|loaded| {
                    self.cache = Some(loaded.clone());
                    loaded
                }),
            },
            Source::Remote(client) => client.list(remote_query),
        };
        self.guard(result)
    }

    // Errors that end the current source (unreachable service, unusable
    // file) drop the selection so the caller has to pick a source again.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.requires_reselection() && self.kind().is_some() {
                info!(error = %e, "leaving current data source");
                self.reset();
            }
        }
        result
    }
}

fn narrow(loaded: Loaded, op: impl FnOnce(&[Vehicle]) -> Vec<Vehicle>) -> Loaded {
    Loaded {
        records: op(&loaded.records),
        skipped: loaded.skipped,
    }
}

fn stale_selection() -> CatalogError {
    CatalogError::NotFound("selection belongs to a different data source; list again".into())
}
