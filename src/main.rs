// Entrypoint for the CLI application.
// - Keeps `main` small: read configuration, set up logging and hand over to
//   the menu loop.
// - Returns `anyhow::Result` so startup failures print a readable message.

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use vehicle_catalog_cli::{config::Config, ui::main_menu};

fn main() -> anyhow::Result<()> {
    // A missing `.env` file is fine; the environment alone is enough.
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never mix with the menus. `RUST_LOG`
    // overrides the default `warn` level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    // Start the interactive menu. This call blocks until the user exits.
    main_menu(&config)?;
    Ok(())
}
