use std::{collections::HashSet, path::{Path, PathBuf}, str::FromStr};

use anyhow::Context;
use roxmltree::{Document, Node};

use crate::{common, config::{ConfigError, SubjectAliases}};

/// A legislative body declaration (`<LegislativeBody id=...>`).
#[derive(Debug, Clone, PartialEq)]
pub struct BodyConfig {
    pub id: String,
    pub name: String,
    pub member: String,
    pub max_districts: i32,
}

/// A subject declaration; `alias_for` marks a synonym that is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectConfig {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub displayed: bool,
    pub sort_key: i32,
    /// Shapefile attribute holding this subject's values.
    pub field: Option<String>,
    pub alias_for: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub id: String,
    pub subject_ref: String,
    pub value: i64,
    pub range1: Option<i64>,
    pub range2: Option<i64>,
}

/// A target used by a body at one geolevel.
#[derive(Debug, Clone, PartialEq)]
pub struct LegislativeTargetConfig {
    pub target_ref: String,
    pub is_default: bool,
}

/// A body's use of a geolevel, optionally nested under a parent geolevel.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLevelBodyConfig {
    pub body_ref: String,
    pub parent_ref: Option<String>,
    pub targets: Vec<LegislativeTargetConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoLevelConfig {
    pub id: String,
    pub name: String,
    pub min_zoom: i32,
    pub sort_key: i32,
    pub shapefile: Option<PathBuf>,
    pub name_field: Option<String>,
    pub supplement_field: Option<String>,
    pub bodies: Vec<GeoLevelBodyConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapServerConfig {
    pub hostname: String,
    pub port: u16,
    pub namespace: String,
    pub namespace_href: String,
    pub admin_user: String,
    pub admin_pass: String,
    pub styles: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub dbtype: String,
}

/// The parsed and cross-reference checked setup document.
#[derive(Debug, Clone)]
pub struct Config {
    base_dir: PathBuf,
    pub simplify_tolerance: Option<f64>,
    pub bodies: Vec<BodyConfig>,
    pub subjects: Vec<SubjectConfig>,
    pub targets: Vec<TargetConfig>,
    pub geolevels: Vec<GeoLevelConfig>,
    pub map_server: Option<MapServerConfig>,
    pub database: Option<DatabaseConfig>,
    aliases: SubjectAliases,
}

/// Describe a node for error messages, e.g. `Subject id="totpop"`.
fn describe(node: &Node) -> String {
    match node.attribute("id").or_else(|| node.attribute("ref")) {
        Some(id) => format!("{} id=\"{}\"", node.tag_name().name(), id),
        None => node.tag_name().name().to_string(),
    }
}

fn required<'a>(node: &Node<'a, '_>, attribute: &str) -> Result<&'a str, ConfigError> {
    node.attribute(attribute).ok_or_else(|| ConfigError::MissingAttribute {
        element: describe(node),
        attribute: attribute.to_string(),
    })
}

fn parsed<T: FromStr>(node: &Node, attribute: &str) -> Result<Option<T>, ConfigError> {
    match node.attribute(attribute).map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| ConfigError::InvalidAttribute {
            element: describe(node),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parsed_required<T: FromStr>(node: &Node, attribute: &str) -> Result<T, ConfigError> {
    parsed(node, attribute)?.ok_or_else(|| ConfigError::MissingAttribute {
        element: describe(node),
        attribute: attribute.to_string(),
    })
}

fn non_empty(node: &Node, attribute: &str) -> Option<String> {
    node.attribute(attribute).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn child_elements<'a, 'input>(node: Node<'a, 'input>, tag: &'static str) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| n.is_element() && n.has_tag_name(tag))
}

fn parse_body(node: Node) -> Result<BodyConfig, ConfigError> {
    Ok(BodyConfig {
        id: required(&node, "id")?.to_string(),
        name: required(&node, "name")?.to_string(),
        member: node.attribute("member").unwrap_or_default().to_string(),
        max_districts: parsed_required(&node, "maxdistricts")?,
    })
}

fn parse_subject(node: Node) -> Result<SubjectConfig, ConfigError> {
    let id = required(&node, "id")?.to_string();
    let alias_for = non_empty(&node, "aliasfor");

    // Aliases only carry their own field; display attributes come from the aliased subject.
    let name = match alias_for {
        Some(_) => node.attribute("name").unwrap_or(id.as_str()).to_string(),
        None => required(&node, "name")?.to_string(),
    };

    Ok(SubjectConfig {
        short_name: node.attribute("short_name").unwrap_or(name.as_str()).to_string(),
        displayed: node.attribute("displayed") == Some("true"),
        sort_key: parsed(&node, "sortkey")?.unwrap_or(0),
        field: non_empty(&node, "field"),
        id,
        name,
        alias_for,
    })
}

fn parse_target(node: Node) -> Result<TargetConfig, ConfigError> {
    Ok(TargetConfig {
        id: required(&node, "id")?.to_string(),
        subject_ref: required(&node, "subjectref")?.to_string(),
        value: parsed_required(&node, "value")?,
        range1: parsed(&node, "range1")?,
        range2: parsed(&node, "range2")?,
    })
}

fn parse_legislative_target(node: Node) -> Result<LegislativeTargetConfig, ConfigError> {
    Ok(LegislativeTargetConfig {
        target_ref: required(&node, "ref")?.to_string(),
        is_default: node.attribute("default").is_some_and(|d| d != "false"),
    })
}

fn parse_geolevel_body(node: Node) -> Result<GeoLevelBodyConfig, ConfigError> {
    let parent_ref = match child_elements(node, "Parent").next() {
        Some(parent) => Some(required(&parent, "ref")?.to_string()),
        None => None,
    };

    Ok(GeoLevelBodyConfig {
        body_ref: required(&node, "ref")?.to_string(),
        parent_ref,
        targets: child_elements(node, "LegislativeTargets")
            .flat_map(|targets| child_elements(targets, "LegislativeTarget"))
            .map(parse_legislative_target)
            .collect::<Result<Vec<_>, _>>()?,
    })
}

fn parse_geolevel(node: Node) -> Result<GeoLevelConfig, ConfigError> {
    let bodies = child_elements(node, "LegislativeBodies")
        .flat_map(|bodies| child_elements(bodies, "LegislativeBody"))
        .map(parse_geolevel_body)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GeoLevelConfig {
        id: required(&node, "id")?.to_string(),
        name: required(&node, "name")?.to_string(),
        min_zoom: parsed(&node, "min_zoom")?.unwrap_or(0),
        sort_key: parsed(&node, "sort_key")?.unwrap_or(0),
        shapefile: non_empty(&node, "shapefile").map(PathBuf::from),
        name_field: non_empty(&node, "namefield"),
        supplement_field: non_empty(&node, "supplementfield"),
        bodies,
    })
}

fn parse_map_server(node: Node) -> Result<MapServerConfig, ConfigError> {
    Ok(MapServerConfig {
        hostname: non_empty(&node, "hostname").unwrap_or_else(|| "localhost".into()),
        port: parsed(&node, "port")?.unwrap_or(8080),
        namespace: required(&node, "ns")?.to_string(),
        namespace_href: required(&node, "nshref")?.to_string(),
        admin_user: required(&node, "adminuser")?.to_string(),
        admin_pass: node.attribute("adminpass").unwrap_or_default().to_string(),
        styles: PathBuf::from(required(&node, "styles")?),
    })
}

fn parse_database(node: Node) -> Result<DatabaseConfig, ConfigError> {
    Ok(DatabaseConfig {
        name: required(&node, "name")?.to_string(),
        user: required(&node, "user")?.to_string(),
        password: node.attribute("password").unwrap_or_default().to_string(),
        host: non_empty(&node, "host").unwrap_or_else(|| "localhost".into()),
        port: parsed(&node, "port")?.unwrap_or(5432),
        dbtype: non_empty(&node, "dbtype").unwrap_or_else(|| "postgis".into()),
    })
}

impl Config {
    /// Read and validate a configuration document from disk.
    /// Relative paths inside it resolve against the document's directory.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        common::require_file_exists(path)?;
        let text = common::read_text(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse_str(&text, &base_dir)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    /// Parse and validate a configuration document.
    pub fn parse_str(text: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let doc = Document::parse(text)?;
        let root = doc.root_element();
        if !root.has_tag_name("DistrictBuilder") {
            return Err(ConfigError::Root(root.tag_name().name().to_string()));
        }

        let elements = |tag: &'static str| root.descendants().filter(move |n| n.is_element() && n.has_tag_name(tag));
        let under = |parent: &'static str, tag: &'static str| elements(tag)
            .filter(move |n| n.parent_element().is_some_and(|p| p.has_tag_name(parent)));

        let simplify_tolerance = elements("Settings").next()
            .map(|settings| parsed(&settings, "simplifytolerance"))
            .transpose()?
            .flatten();

        let bodies = elements("LegislativeBody")
            .filter(|n| n.has_attribute("id"))
            .map(parse_body)
            .collect::<Result<Vec<_>, _>>()?;
        let subjects = elements("Subject")
            .filter(|n| n.has_attribute("id"))
            .map(parse_subject)
            .collect::<Result<Vec<_>, _>>()?;
        let targets = under("Targets", "Target").map(parse_target).collect::<Result<Vec<_>, _>>()?;
        let geolevels = under("GeoLevels", "GeoLevel").map(parse_geolevel).collect::<Result<Vec<_>, _>>()?;

        let map_server = elements("MapServer").next().map(parse_map_server).transpose()?;
        let database = elements("Database").next().map(parse_database).transpose()?;

        let aliases = SubjectAliases::build(&subjects)?;

        let config = Self {
            base_dir: base_dir.to_path_buf(),
            simplify_tolerance,
            bodies,
            subjects,
            targets,
            geolevels,
            map_server,
            database,
            aliases,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check id uniqueness and that every cross reference resolves.
    fn validate(&self) -> Result<(), ConfigError> {
        fn unique<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> Result<(), ConfigError> {
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(id) {
                    return Err(ConfigError::DuplicateId { kind, id: id.to_string() });
                }
            }
            Ok(())
        }

        fn resolves(kind: &'static str, id: &str, found: bool) -> Result<(), ConfigError> {
            if found { Ok(()) } else { Err(ConfigError::UnresolvedReference { kind, id: id.to_string() }) }
        }

        unique("LegislativeBody", self.bodies.iter().map(|b| b.id.as_str()))?;
        unique("Subject", self.subjects.iter().map(|s| s.id.as_str()))?;
        unique("Target", self.targets.iter().map(|t| t.id.as_str()))?;
        unique("GeoLevel", self.geolevels.iter().map(|g| g.id.as_str()))?;
        unique("GeoLevel name", self.geolevels.iter().map(|g| g.name.as_str()))?;

        for target in &self.targets {
            resolves("Subject", &target.subject_ref, self.subject(&target.subject_ref).is_some())?;
        }

        for geolevel in &self.geolevels {
            for body in &geolevel.bodies {
                resolves("LegislativeBody", &body.body_ref, self.body(&body.body_ref).is_some())?;
                if let Some(parent) = &body.parent_ref {
                    resolves("GeoLevel", parent, self.geolevel(parent).is_some())?;
                }
                for target in &body.targets {
                    resolves("Target", &target.target_ref, self.target(&target.target_ref).is_some())?;
                }
            }
        }
        Ok(())
    }

    /// Directory that relative document paths resolve against.
    #[inline] pub fn base_dir(&self) -> &Path { &self.base_dir }

    /// Resolve a document path against the document's directory.
    #[inline] pub fn resolve_path(&self, path: &Path) -> PathBuf { common::resolve_relative(&self.base_dir, path) }

    /// The flat subject alias mapping.
    #[inline] pub fn aliases(&self) -> &SubjectAliases { &self.aliases }

    pub fn body(&self, id: &str) -> Option<&BodyConfig> { self.bodies.iter().find(|b| b.id == id) }

    pub fn subject(&self, id: &str) -> Option<&SubjectConfig> { self.subjects.iter().find(|s| s.id == id) }

    pub fn target(&self, id: &str) -> Option<&TargetConfig> { self.targets.iter().find(|t| t.id == id) }

    pub fn geolevel(&self, id: &str) -> Option<&GeoLevelConfig> { self.geolevels.iter().find(|g| g.id == id) }

    pub fn geolevel_by_name(&self, name: &str) -> Option<&GeoLevelConfig> {
        self.geolevels.iter().find(|g| g.name == name)
    }

    /// Shapefile field to canonical subject id pairs for a geolevel, in document order.
    /// The field comes from the subject each target references (an alias keeps its own field).
    pub fn subject_fields(&self, geolevel: &GeoLevelConfig) -> Result<Vec<(String, String)>, ConfigError> {
        let mut fields: Vec<(String, String)> = Vec::new();
        for target in geolevel.bodies.iter().flat_map(|body| &body.targets) {
            let target = self.target(&target.target_ref)
                .ok_or_else(|| ConfigError::UnresolvedReference { kind: "Target", id: target.target_ref.clone() })?;
            let subject = self.subject(&target.subject_ref)
                .ok_or_else(|| ConfigError::UnresolvedReference { kind: "Subject", id: target.subject_ref.clone() })?;
            let field = subject.field.clone().ok_or_else(|| ConfigError::MissingAttribute {
                element: format!("Subject id=\"{}\"", subject.id),
                attribute: "field".into(),
            })?;
            let canonical = self.aliases.resolve(&subject.id)
                .ok_or_else(|| ConfigError::UnresolvedReference { kind: "Subject", id: subject.id.clone() })?;

            if !fields.iter().any(|(f, _)| *f == field) {
                fields.push((field, canonical.to_string()));
            }
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DistrictBuilder>
  <Settings simplifytolerance="25.5"/>
  <LegislativeBodies>
    <LegislativeBody id="congress" name="Congressional" member="District %s" maxdistricts="19"/>
  </LegislativeBodies>
  <Subjects>
    <Subject id="totpop" name="Total Population" short_name="Total Pop." displayed="true" sortkey="1" field="POP"/>
    <Subject id="pop20" aliasfor="totpop" field="POP20"/>
  </Subjects>
  <Targets>
    <Target id="t_pop" subjectref="pop20" value="700000" range1="690000" range2="710000"/>
  </Targets>
  <GeoLevels>
    <GeoLevel id="county" name="county" min_zoom="0" sort_key="1" shapefile="shp/county.shp" namefield="NAME">
      <LegislativeBodies>
        <LegislativeBody ref="congress">
          <LegislativeTargets>
            <LegislativeTarget ref="t_pop" default="true"/>
          </LegislativeTargets>
        </LegislativeBody>
      </LegislativeBodies>
    </GeoLevel>
  </GeoLevels>
  <MapServer hostname="" ns="db" nshref="https://example.org/db" adminuser="admin" adminpass="pw" styles="sld"/>
</DistrictBuilder>"#;

    #[test]
    fn parses_sample_document() {
        let config = Config::parse_str(SAMPLE, Path::new("/cfg")).unwrap();

        assert_eq!(config.simplify_tolerance, Some(25.5));
        assert_eq!(config.bodies.len(), 1);
        assert_eq!(config.bodies[0].max_districts, 19);
        assert_eq!(config.subjects.len(), 2);
        assert!(config.subjects[0].displayed);
        assert_eq!(config.subjects[1].alias_for.as_deref(), Some("totpop"));
        assert_eq!(config.targets[0].range2, Some(710000));

        let county = &config.geolevels[0];
        assert_eq!(county.bodies[0].targets[0], LegislativeTargetConfig { target_ref: "t_pop".into(), is_default: true });
        assert_eq!(config.resolve_path(county.shapefile.as_deref().unwrap()), PathBuf::from("/cfg/shp/county.shp"));

        let map_server = config.map_server.as_ref().unwrap();
        assert_eq!(map_server.hostname, "localhost");
        assert_eq!(map_server.port, 8080);
        assert!(config.database.is_none());
    }

    #[test]
    fn alias_field_maps_to_canonical_subject() {
        let config = Config::parse_str(SAMPLE, Path::new(".")).unwrap();
        let fields = config.subject_fields(&config.geolevels[0]).unwrap();
        assert_eq!(fields, vec![("POP20".to_string(), "totpop".to_string())]);
    }

    #[test]
    fn unresolved_target_subject_is_rejected() {
        let text = SAMPLE.replace(r#"subjectref="pop20""#, r#"subjectref="nobody""#);
        let err = Config::parse_str(&text, Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedReference { kind: "Subject", ref id } if id == "nobody"));
    }

    #[test]
    fn unresolved_parent_is_rejected() {
        let text = SAMPLE.replace(r#"<LegislativeTargets>"#, r#"<Parent ref="state"/><LegislativeTargets>"#);
        let err = Config::parse_str(&text, Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedReference { kind: "GeoLevel", .. }));
    }

    #[test]
    fn non_numeric_attribute_is_rejected() {
        let text = SAMPLE.replace(r#"maxdistricts="19""#, r#"maxdistricts="many""#);
        let err = Config::parse_str(&text, Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAttribute { ref attribute, .. } if attribute == "maxdistricts"));
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(matches!(Config::parse_str("<DistrictBuilder>", Path::new(".")), Err(ConfigError::Xml(_))));
        assert!(matches!(Config::parse_str("<Other/>", Path::new(".")), Err(ConfigError::Root(_))));
    }
}
