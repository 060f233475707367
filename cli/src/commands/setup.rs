use std::path::PathBuf;

use anyhow::Result;
use districtbuilder::{
    run_setup, CatalogStore, Config, GeolevelSelection, ImportSettings, PostgisStore, SetupOptions, SqliteStore,
};

/// The document's PostGIS database unless a SQLite file is asked for.
fn open_store(config: &Config, sqlite: Option<&PathBuf>) -> Result<Box<dyn CatalogStore>> {
    let store: Box<dyn CatalogStore> = match (sqlite, &config.database) {
        (Some(path), _) => {
            println!("[setup] opening catalog {}", path.display());
            Box::new(SqliteStore::open(path)?)
        }
        (None, Some(database)) => {
            println!("[setup] connecting to {}@{}:{}/{}", database.user, database.host, database.port, database.name);
            Box::new(PostgisStore::connect(database)?)
        }
        (None, None) => {
            let path = PathBuf::from("./districtbuilder.sqlite");
            println!("[setup] opening catalog {}", path.display());
            Box::new(SqliteStore::open(path)?)
        }
    };
    Ok(store)
}

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::SetupArgs) -> Result<()> {
    let config = Config::from_path(&args.config)?;

    let geolevels = match (args.all, args.geolevels.is_empty()) {
        (true, _) => GeolevelSelection::All,
        (false, true) => GeolevelSelection::None,
        (false, false) => GeolevelSelection::Named(args.geolevels.clone()),
    };
    let options = SetupOptions {
        geolevels,
        views: args.views,
        provision: args.geoserver,
        settings: ImportSettings::resolve(&config, args.tolerance),
    };

    let mut store = open_store(&config, args.sqlite.as_ref())?;
    let report = run_setup(store.as_mut(), &config, &options)?;

    println!("[setup] created {} catalog rows", report.reconciliation.created.total());
    for import in &report.imports {
        println!(
            "[setup] {}: {} imported, {} already present, {} skipped, {} zero-filled values",
            import.geolevel, import.imported, import.existing, import.skipped(), import.zero_filled(),
        );
    }
    if !report.views.is_empty() {
        println!("[setup] created {} views", report.views.len());
    }
    if let Some(provisioned) = &report.provisioned {
        println!("[setup] completed {} map server steps", provisioned.completed.len());
    }

    if let Some(path) = &args.report {
        report.write_json(path)?;
        println!("[setup] wrote report to {}", path.display());
    }
    Ok(())
}
