use std::path::PathBuf;

/// Redistricting dataset setup (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "districtbuilder", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Build the catalog, import geolevels, create views and configure the map server
    Setup(SetupArgs),

    /// Parse and validate a configuration document without touching any database
    Check(CheckArgs),
}

#[derive(clap::Args, Debug)]
pub struct SetupArgs {
    /// Configuration document (XML)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Keep the catalog in this SQLite file instead of the document's <Database>.
    /// Without either, "./districtbuilder.sqlite" is used.
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub sqlite: Option<PathBuf>,

    /// Import the geolevel with this name (repeatable)
    #[arg(short = 'g', long = "geolevel", value_name = "NAME")]
    pub geolevels: Vec<String>,

    /// Import every geolevel that names a shapefile
    #[arg(long, conflicts_with = "geolevels")]
    pub all: bool,

    /// Create the identify, boundary and demographic views
    #[arg(long)]
    pub views: bool,

    /// Configure map server workspace, data store, layers and styles
    #[arg(long)]
    pub geoserver: bool,

    /// Simplification tolerance in map units (overrides the document)
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Write a JSON run report to this file
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub report: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Configuration document (XML)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,
}
