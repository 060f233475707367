use std::path::{Path, PathBuf};

use geo::Rect;

use crate::{
    config::{DatabaseConfig, MapServerConfig},
    views::ViewPlan,
};

/// Name of the data store created in the map server workspace.
pub(crate) const DATASTORE: &str = "PostGIS";

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// An `application/xml` document.
    Xml(String),
    /// A style file, read when the step runs and sent as `application/vnd.ogc.sld+xml`.
    Sld(PathBuf),
}

/// One REST call against the map server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Short description used in logs and errors.
    pub name: String,
    pub method: Method,
    pub path: String,
    pub payload: Payload,
}

/// The ordered calls that configure the map server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub steps: Vec<Step>,
}

/// Escape text for inclusion in an XML element.
fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

struct PlanBuilder<'a> {
    namespace: &'a str,
    styles: &'a Path,
    bbox: String,
    steps: Vec<Step>,
}

impl PlanBuilder<'_> {
    fn push(&mut self, name: String, method: Method, path: String, payload: Payload) {
        self.steps.push(Step { name, method, path, payload });
    }

    fn feature_type(&mut self, name: &str, native_name: Option<&str>) {
        let native = native_name
            .map(|native| format!("<nativeName>{}</nativeName>", xml_escape(native)))
            .unwrap_or_default();
        let body = format!(
            "{XML_HEADER}<featureType><name>{0}</name><title>{0}</title>{1}{2}</featureType>",
            xml_escape(name), native, self.bbox,
        );
        self.push(
            format!("create feature type '{name}'"),
            Method::Post,
            format!("/geoserver/rest/workspaces/{}/datastores/{DATASTORE}/featuretypes", self.namespace),
            Payload::Xml(body),
        );
    }

    /// Register a style, upload its SLD file and make it the layer's default style.
    fn styled_layer(&mut self, style: &str, layer: &str) {
        self.push(
            format!("create style '{style}'"),
            Method::Post,
            "/geoserver/rest/styles".into(),
            Payload::Xml(format!(
                "{XML_HEADER}<style><name>{0}</name><filename>{0}.sld</filename></style>",
                xml_escape(style),
            )),
        );
        self.push(
            format!("upload style file '{style}.sld'"),
            Method::Put,
            format!("/geoserver/rest/styles/{style}"),
            Payload::Sld(self.styles.join(format!("{style}.sld"))),
        );
        self.push(
            format!("assign style '{style}' to layer '{layer}'"),
            Method::Put,
            format!("/geoserver/rest/layers/{}:{layer}", self.namespace),
            Payload::Xml(format!(
                "{XML_HEADER}<layer><defaultStyle><name>{}</name></defaultStyle><enabled>true</enabled></layer>",
                xml_escape(style),
            )),
        );
    }
}

impl ProvisionPlan {
    /// Build the call sequence for the planned views. `styles` is the resolved style directory.
    pub fn build(
        map_server: &MapServerConfig,
        database: &DatabaseConfig,
        styles: &Path,
        views: &ViewPlan,
        extent: Rect<f64>,
    ) -> Self {
        let namespace = map_server.namespace.as_str();
        let mut plan = PlanBuilder {
            namespace,
            styles,
            bbox: format!(
                "<nativeBoundingBox><minx>{:.1}</minx><miny>{:.1}</miny><maxx>{:.1}</maxx><maxy>{:.1}</maxy></nativeBoundingBox>",
                extent.min().x, extent.min().y, extent.max().x, extent.max().y,
            ),
            steps: Vec::new(),
        };

        plan.push(
            "create workspace and namespace".into(),
            Method::Post,
            "/geoserver/rest/namespaces".into(),
            Payload::Xml(format!(
                "{XML_HEADER}<namespace><prefix>{}</prefix><uri>{}</uri></namespace>",
                xml_escape(namespace), xml_escape(&map_server.namespace_href),
            )),
        );

        plan.push(
            format!("add {DATASTORE} data store"),
            Method::Post,
            format!("/geoserver/rest/workspaces/{namespace}/datastores"),
            Payload::Xml(format!(
                "{XML_HEADER}<dataStore><name>{DATASTORE}</name><connectionParameters>\
                 <host>{}</host><port>{}</port><database>{}</database><user>{}</user><passwd>{}</passwd>\
                 <dbtype>{}</dbtype><namespace>{}</namespace><schema>{}</schema>\
                 </connectionParameters></dataStore>",
                xml_escape(&database.host), database.port, xml_escape(&database.name), xml_escape(&database.user),
                xml_escape(&database.password), xml_escape(&database.dbtype), xml_escape(&map_server.namespace_href),
                xml_escape(&database.user),
            )),
        );

        plan.feature_type(&views.identify.name, None);

        for level in &views.levels {
            let geolevel = level.geolevel.as_str();
            plan.feature_type(&level.boundary.name, None);

            for (i, (subject, demo)) in level.demographics.iter().enumerate() {
                plan.feature_type(&demo.name, None);
                plan.styled_layer(&format!("{geolevel}_{subject}"), &demo.name);

                // The uncolored and boundary-only layers reuse the first demographic view.
                if i == 0 {
                    let plain = format!("demo_{geolevel}");
                    plan.feature_type(&plain, Some(&demo.name));
                    plan.styled_layer(&format!("{geolevel}_none"), &plain);

                    let boundaries = format!("{geolevel}_boundaries");
                    plan.feature_type(&boundaries, Some(&demo.name));
                    plan.styled_layer(&boundaries, &boundaries);
                }
            }
        }

        Self { steps: plan.steps }
    }

    pub fn len(&self) -> usize { self.steps.len() }

    pub fn is_empty(&self) -> bool { self.steps.is_empty() }
}
