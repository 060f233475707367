use anyhow::Result;
use districtbuilder::Config;

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::CheckArgs) -> Result<()> {
    let config = Config::from_path(&args.config)?;

    println!("[check] {} is valid", args.config.display());
    println!("[check] {} legislative bodies", config.bodies.len());
    for body in &config.bodies {
        println!("          {} ({} districts)", body.name, body.max_districts);
    }

    let aliases = config.subjects.iter().filter(|s| config.aliases().is_alias(&s.id)).count();
    println!("[check] {} subjects ({} aliases)", config.subjects.len(), aliases);
    println!("[check] {} targets", config.targets.len());

    println!("[check] {} geolevels", config.geolevels.len());
    for geolevel in &config.geolevels {
        let shapefile = geolevel.shapefile.as_ref()
            .map(|path| config.resolve_path(path).display().to_string())
            .unwrap_or_else(|| "no shapefile".into());
        println!("          {} <- {}", geolevel.name, shapefile);
    }

    if config.map_server.is_none() {
        println!("[check] no <MapServer> element: --geoserver is unavailable");
    }
    Ok(())
}
