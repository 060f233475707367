use std::{fs::File, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::info;

use crate::{
    catalog::{reconcile, CatalogStore, Reconciliation, RowCounts},
    common,
    config::{Config, ConfigError, GeoLevelConfig, ImportSettings},
    import::{GeounitImporter, ImportReport, LayerSpec},
    provision::{GeoServerClient, ProvisionPlan, ProvisionReport},
    views::ViewPlan,
};

/// Which geolevels get their shapefiles imported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GeolevelSelection {
    #[default]
    None,
    /// Every geolevel that names a shapefile, in document order.
    All,
    /// Geolevels by name (or id), in the order given.
    Named(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupOptions {
    pub geolevels: GeolevelSelection,
    pub views: bool,
    pub provision: bool,
    pub settings: ImportSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub reconciliation: Reconciliation,
    pub imports: Vec<ImportReport>,
    pub views: Vec<String>,
    pub provisioned: Option<ProvisionReport>,
    /// Row counts after the run.
    pub totals: RowCounts,
}

impl SetupReport {
    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create report file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Resolve the selection against the document before anything is written.
fn select_geolevels<'a>(config: &'a Config, selection: &GeolevelSelection) -> Result<Vec<&'a GeoLevelConfig>, ConfigError> {
    match selection {
        GeolevelSelection::None => Ok(Vec::new()),
        GeolevelSelection::All => Ok(config.geolevels.iter().filter(|g| g.shapefile.is_some()).collect()),
        GeolevelSelection::Named(names) => names.iter()
            .map(|name| -> Result<&'a GeoLevelConfig, ConfigError> {
                let geolevel = config.geolevel_by_name(name)
                    .or_else(|| config.geolevel(name))
                    .ok_or_else(|| ConfigError::UnknownGeoLevel(name.clone()))?;
                if geolevel.shapefile.is_none() {
                    return Err(ConfigError::MissingAttribute {
                        element: format!("GeoLevel id=\"{}\"", geolevel.id),
                        attribute: "shapefile".into(),
                    });
                }
                Ok(geolevel)
            })
            .collect(),
    }
}

/// Run the setup pipeline against `store`.
pub fn run(store: &mut dyn CatalogStore, config: &Config, options: &SetupOptions) -> Result<SetupReport> {
    let selected = select_geolevels(config, &options.geolevels)?;
    if options.provision {
        config.map_server.as_ref().ok_or(ConfigError::MissingElement("MapServer"))?;
        let database = config.database.as_ref().ok_or(ConfigError::MissingElement("Database"))?;
        if !store.serves(database) {
            return Err(ConfigError::CatalogNotShared(database.name.clone()).into());
        }
    }

    // 1) Catalog hierarchy
    let reconciliation = reconcile(store, config)?;

    // 2) Geounits
    let importer = GeounitImporter::new(options.settings);
    let mut imports = Vec::with_capacity(selected.len());
    for geolevel in selected {
        let layer = LayerSpec::from_config(config, geolevel, &reconciliation)?;
        let shapefile = geolevel.shapefile.as_deref()
            .ok_or_else(|| anyhow!("Geolevel '{}' has no shapefile", geolevel.id))?;
        let path = config.resolve_path(shapefile);
        let report = importer.import_shapefile(store, &layer, &path)
            .with_context(|| format!("Failed to import geolevel '{}' from {}", geolevel.name, path.display()))?;
        imports.push(report);
    }

    // 3) Views
    let needs_views = options.views || options.provision;
    let plan = if needs_views { Some(ViewPlan::build(&store.geolevels()?, &store.subjects()?)) } else { None };
    let mut views = Vec::new();
    if let (true, Some(plan)) = (options.views, &plan) {
        store.apply_views(plan).context("Failed to create views")?;
        views = plan.names();
        info!("Created {} views", views.len());
    }

    // 4) Map server
    let mut provisioned = None;
    if let (true, Some(plan), Some(map_server), Some(database)) =
        (options.provision, &plan, &config.map_server, &config.database)
    {
        let extent = store.extent()?
            .ok_or_else(|| anyhow!("No geounits are stored, so the layer extent is unknown; import a geolevel first"))?;
        let styles = config.resolve_path(&map_server.styles);
        common::require_dir_exists(&styles)?;
        let steps = ProvisionPlan::build(map_server, database, &styles, plan, extent);
        let client = GeoServerClient::new(map_server)?;
        info!(url = client.base_url(), steps = steps.len(), "Configuring map server");
        provisioned = Some(client.run(&steps)?);
    }

    Ok(SetupReport { reconciliation, imports, views, provisioned, totals: store.counts()? })
}
