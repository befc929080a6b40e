// UI layer: interactive menus built with `dialoguer`.
// Every catalog operation goes through `Session`; this module only prompts
// for input and prints what comes back.

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::CatalogError;
use crate::local::{Loaded, LocalStore};
use crate::query::{Direction, Statistics};
use crate::record::{max_year, Field, Vehicle, VehiclePatch, MIN_YEAR};
use crate::session::{Command, Filter, Outcome, Selection, Session, SourceKind};
use crate::subgroups;

const ACTIONS: [&str; 13] = [
    "List all",
    "Search by make or model",
    "Find by model",
    "Filter by fuel type",
    "Filter by transmission",
    "Filter by year range",
    "Sort",
    "Statistics",
    "Add a vehicle",
    "Edit a vehicle",
    "Delete a vehicle",
    "Switch data source",
    "Exit",
];

enum Flow {
    Continue,
    Exit,
}

/// Main interactive loop. Asks for a data source first, then runs the
/// operations menu until the user chooses "Exit".
pub fn main_menu(config: &Config) -> Result<()> {
    let mut session = Session::new();
    loop {
        if session.kind().is_none() && !choose_source(&mut session, config)? {
            break;
        }

        let mut items: Vec<&str> = ACTIONS.to_vec();
        if session.kind() == Some(SourceKind::Local) {
            items.insert(ACTIONS.len() - 2, "Show subgroup files");
        }
        // `Select` shows a keyboard-navigable list in the terminal.
        let choice = Select::new()
            .with_prompt(source_label(&session))
            .items(&items)
            .default(0)
            .interact()?;
        clear_screen()?;

        // Catalog errors are shown and the menu comes back; anything else
        // (a broken terminal) ends the program.
        match run_action(&mut session, config, items[choice]) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => match e.downcast::<CatalogError>() {
                Ok(err) => report(&err),
                Err(other) => return Err(other),
            },
        }
    }
    println!("Bye!");
    Ok(())
}

fn run_action(session: &mut Session, config: &Config, action: &str) -> Result<Flow> {
    let command = match action {
        "List all" => Command::List,
        "Search by make or model" => {
            Command::Search(prompt_text("Make or model (or part of it)")?)
        }
        "Find by model" => {
            find_by_model(session)?;
            return Ok(Flow::Continue);
        }
        "Filter by fuel type" => Command::Filter(Filter::FuelType(prompt_text("Fuel type")?)),
        "Filter by transmission" => {
            Command::Filter(Filter::Transmission(prompt_text("Transmission")?))
        }
        "Filter by year range" => {
            let min = prompt_year("Minimum year")?;
            let max = prompt_year("Maximum year")?;
            Command::Filter(Filter::YearRange { min, max })
        }
        "Sort" => prompt_sort()?,
        "Statistics" => Command::Stats,
        "Add a vehicle" => Command::Add(prompt_vehicle()?),
        "Edit a vehicle" => {
            if let Some(selection) = pick(session, "Vehicle to edit")? {
                edit(session, selection)?;
            }
            return Ok(Flow::Continue);
        }
        "Delete a vehicle" => {
            if let Some(selection) = pick(session, "Vehicle to delete")? {
                delete(session, selection)?;
            }
            return Ok(Flow::Continue);
        }
        "Show subgroup files" => {
            show_subgroups(config)?;
            return Ok(Flow::Continue);
        }
        "Switch data source" => {
            session.reset();
            return Ok(Flow::Continue);
        }
        _ => return Ok(Flow::Exit),
    };
    let message = match command {
        Command::Add(_) => "Saving...",
        Command::Stats => "Computing...",
        _ => "Loading...",
    };
    show(run(session, message, command)?);
    Ok(Flow::Continue)
}

/// Returns `false` when the user picks "Exit".
fn choose_source(session: &mut Session, config: &Config) -> Result<bool> {
    loop {
        let items = ["Local file", "Remote service", "Exit"];
        let choice = Select::new()
            .with_prompt("Where should the catalog come from?")
            .items(&items)
            .default(0)
            .interact()?;
        clear_screen()?;
        let command = match choice {
            0 => Command::SelectLocal(
                LocalStore::new(&config.data_file).with_subgroups(config.subgroups),
            ),
            1 => match ApiClient::from_config(config) {
                Ok(client) => Command::SelectRemote(client),
                Err(e) => {
                    report(&e);
                    continue;
                }
            },
            _ => return Ok(false),
        };
        let selected = if choice == 1 {
            let spinner = spinner("Contacting the catalog service...");
            let selected = session.execute(command);
            spinner.finish_and_clear();
            selected
        } else {
            // Load right away so an unreadable file is reported here.
            session
                .execute(command)
                .and_then(|_| session.execute(Command::List))
        };
        match selected {
            Ok(Outcome::Records(loaded)) => {
                println!(
                    "Local catalog {} ({} records).",
                    config.data_file.display(),
                    loaded.records.len()
                );
                print_skipped(loaded.skipped);
                return Ok(true);
            }
            Ok(_) => {
                println!("Connected to {}.", config.api_url);
                return Ok(true);
            }
            Err(e) => report(&e),
        }
    }
}

fn prompt_sort() -> Result<Command> {
    let names: Vec<&str> = Field::ALL.iter().map(|f| f.name()).collect();
    let field = Field::ALL[Select::new()
        .with_prompt("Sort by")
        .items(&names)
        .default(0)
        .interact()?];
    let direction = if Confirm::new()
        .with_prompt("Descending order?")
        .default(false)
        .interact()?
    {
        Direction::Descending
    } else {
        Direction::Ascending
    };
    Ok(Command::Sort(field, direction))
}

fn prompt_vehicle() -> Result<Vehicle> {
    println!("--- Add a vehicle ---");
    let make = prompt_text("Make")?;
    let model = prompt_text("Model")?;
    let year = prompt_year("Year")?;
    let fuel = prompt_text("Fuel type (Gasoline, Diesel, Hybrid, Electric, ...)")?;
    let transmission = prompt_text("Transmission (Manual, Automatic, CVT, ...)")?;
    Ok(Vehicle::new(&make, &model, year, &fuel, &transmission)?)
}

fn find_by_model(session: &mut Session) -> Result<()> {
    let model = prompt_text("Model")?;
    let Outcome::Found(found) = run(session, "Searching...", Command::FindByModel(model.clone()))?
    else {
        return Ok(());
    };
    let Some(selection) = found else {
        println!("No vehicle matches model {:?}.", model);
        return Ok(());
    };
    println!("Found {}", selection.vehicle);
    let next = Select::new()
        .with_prompt("What now?")
        .items(&["Edit it", "Delete it", "Back"])
        .default(2)
        .interact()?;
    match next {
        0 => edit(session, selection),
        1 => delete(session, selection),
        _ => Ok(()),
    }
}

fn edit(session: &mut Session, selection: Selection) -> Result<()> {
    println!("Editing {} (press Enter to keep the current value)", selection.vehicle);

    let mut patch = VehiclePatch::default();
    for field in Field::ALL {
        let current = selection.vehicle.value(field);
        let value: String = Input::new()
            .with_prompt(format!("New {} [{}]", field, current))
            .allow_empty(true)
            .interact_text()?;
        if value.trim().is_empty() {
            continue;
        }
        if let Err(e) = patch.set(field, &value) {
            println!("{}; keeping {:?}.", e, current);
        }
    }
    if patch.is_empty() {
        println!("Nothing changed.");
        return Ok(());
    }

    show(run(session, "Saving...", Command::Edit(selection, patch))?);
    Ok(())
}

fn delete(session: &mut Session, selection: Selection) -> Result<()> {
    let confirmed = Confirm::new()
        .with_prompt(format!(
            "Delete {} {}?",
            selection.vehicle.make, selection.vehicle.model
        ))
        .default(false)
        .interact()?;
    if !confirmed {
        println!("Cancelled.");
        return Ok(());
    }
    show(run(session, "Deleting...", Command::Delete(selection))?);
    Ok(())
}

// Search, then let the user choose one of the hits.
fn pick(session: &mut Session, prompt: &str) -> Result<Option<Selection>> {
    let text = prompt_text("Make or model (or part of it)")?;
    let Outcome::Candidates(mut candidates) =
        run(session, "Searching...", Command::Candidates(text.clone()))?
    else {
        return Ok(None);
    };
    if candidates.is_empty() {
        println!("No vehicle matches {:?}.", text);
        return Ok(None);
    }
    let labels: Vec<String> = candidates.iter().map(|c| c.vehicle.to_string()).collect();
    let index = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(Some(candidates.swap_remove(index)))
}

fn show_subgroups(config: &Config) -> Result<()> {
    let root = subgroups::root_for(&config.data_file);
    let mut files = Vec::new();
    for (grouping, summary) in subgroups::summary(&config.data_file)? {
        println!("{} ({} files)", grouping.dir_name(), summary.files.len());
        for file in summary.files {
            println!("    - {}", file);
            files.push((grouping, file));
        }
    }
    if files.is_empty() {
        return Ok(());
    }

    let mut labels: Vec<String> = files
        .iter()
        .map(|(grouping, file)| format!("{}/{}", grouping.dir_name(), file))
        .collect();
    labels.push("Back".to_string());
    let choice = Select::new()
        .with_prompt("Open a subgroup file")
        .items(&labels)
        .default(labels.len() - 1)
        .interact()?;
    if let Some((grouping, file)) = files.get(choice) {
        let path = root.join(grouping.dir_name()).join(file);
        print_records(subgroups::read_subgroup(&path)?);
    }
    Ok(())
}

fn show(outcome: Outcome) {
    match outcome {
        Outcome::Selected(kind) => println!("Using the {:?} catalog.", kind),
        Outcome::Records(loaded) => {
            if loaded.records.is_empty() {
                println!("No vehicle matches.");
            }
            print_records(loaded);
        }
        Outcome::Statistics(stats) => print_statistics(&stats),
        Outcome::Candidates(candidates) => {
            for candidate in candidates {
                println!("    - {}", candidate.vehicle);
            }
        }
        Outcome::Found(Some(selection)) => println!("Found {}", selection.vehicle),
        Outcome::Found(None) => println!("No vehicle matches."),
        Outcome::Saved(vehicle) => println!("Saved: {}", vehicle),
        Outcome::Deleted(vehicle) => println!("Deleted {} {}.", vehicle.make, vehicle.model),
    }
}

fn report(err: &CatalogError) {
    println!("Error: {}", err);
    if err.requires_reselection() {
        println!("Please choose a data source again.");
    }
}

fn print_records(loaded: Loaded) {
    for (i, vehicle) in loaded.records.iter().enumerate() {
        println!("{:>3}. {}", i + 1, vehicle);
    }
    println!("{} vehicle(s).", loaded.records.len());
    print_skipped(loaded.skipped);
}

fn print_skipped(skipped: usize) {
    if skipped > 0 {
        println!("Skipped {} invalid record(s).", skipped);
    }
}

fn print_statistics(stats: &Statistics) {
    println!("********* Statistics *********");
    match (&stats.oldest, &stats.newest) {
        (Some(oldest), Some(newest)) => {
            println!("Oldest: {} {} ({})", oldest.make, oldest.model, oldest.year);
            println!("Newest: {} {} ({})", newest.make, newest.model, newest.year);
        }
        _ => println!("No vehicles."),
    }
    println!("Average year: {}", stats.average_label());
    for (title, counts) in [
        ("By make", &stats.counts_by_make),
        ("By fuel type", &stats.counts_by_fuel_type),
        ("By transmission", &stats.counts_by_transmission),
    ] {
        println!("{}:", title);
        for (label, count) in counts {
            println!("    - {}: {}", label, count);
        }
    }
}

fn prompt_text(prompt: &str) -> io::Result<String> {
    Input::<String>::new()
        .with_prompt(prompt)
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if input.trim().is_empty() {
                Err("cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .map(|s| s.trim().to_string())
}

fn prompt_year(prompt: &str) -> io::Result<i32> {
    let max = max_year();
    Input::<i32>::new()
        .with_prompt(format!("{} ({}-{})", prompt, MIN_YEAR, max))
        .validate_with(move |year: &i32| -> std::result::Result<(), String> {
            if (MIN_YEAR..=max).contains(year) {
                Ok(())
            } else {
                Err(format!("must be between {} and {}", MIN_YEAR, max))
            }
        })
        .interact_text()
}

fn source_label(session: &Session) -> &'static str {
    match session.kind() {
        Some(SourceKind::Local) => "Catalog (local file)",
        Some(SourceKind::Remote) => "Catalog (remote service)",
        None => "Catalog",
    }
}

fn clear_screen() -> io::Result<()> {
    execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))
}

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

// Remote calls get a spinner; local ones are quick enough without.
fn run(
    session: &mut Session,
    message: &'static str,
    command: Command,
) -> std::result::Result<Outcome, CatalogError> {
    if session.kind() == Some(SourceKind::Remote) {
        let spinner = spinner(message);
        let result = session.execute(command);
        spinner.finish_and_clear();
        result
    } else {
        session.execute(command)
    }
}
