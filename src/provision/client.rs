use std::path::PathBuf;

use anyhow::Context;
use reqwest::{
    blocking::Client,
    header::{ACCEPT, CONTENT_TYPE},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::MapServerConfig,
    provision::{Method, Payload, ProvisionPlan, Step},
};

const XML: &str = "application/xml";
const SLD: &str = "application/vnd.ogc.sld+xml";

/// The first failure of a provisioning run. Steps already sent are not undone.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("map server rejected step '{step}' with HTTP status {status}")]
    Status { step: String, status: u16 },
    #[error("could not reach map server during step '{step}'")]
    Transport { step: String, source: reqwest::Error },
    #[error("could not load style file {}; style files are named <geolevel>_<subject>.sld", path.display())]
    StyleFile { path: PathBuf, source: std::io::Error },
}

/// Steps that completed, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub completed: Vec<String>,
}

/// Blocking REST client for the map server's configuration API.
pub struct GeoServerClient {
    http: Client,
    base_url: String,
    user: String,
    password: String,
}

impl GeoServerClient {
    /// Client for `http://<hostname>:<port>` with the configured admin credentials.
    pub fn new(map_server: &MapServerConfig) -> anyhow::Result<Self> {
        Self::with_base_url(
            format!("http://{}:{}", map_server.hostname, map_server.port),
            &map_server.admin_user,
            &map_server.admin_pass,
        )
    }

    pub fn with_base_url(base_url: impl Into<String>, user: &str, password: &str) -> anyhow::Result<Self> {
        let http = Client::builder().build().context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    #[inline] pub fn base_url(&self) -> &str { &self.base_url }

    /// Send every step in order, stopping at the first one that fails.
    pub fn run(&self, plan: &ProvisionPlan) -> Result<ProvisionReport, ProvisionError> {
        let mut report = ProvisionReport::default();
        for step in &plan.steps {
            self.execute(step)?;
            info!("Map server: {}", step.name);
            report.completed.push(step.name.clone());
        }
        Ok(report)
    }

    fn execute(&self, step: &Step) -> Result<(), ProvisionError> {
        let (content_type, body) = match &step.payload {
            Payload::Xml(xml) => (XML, xml.clone()),
            Payload::Sld(path) => {
                let sld = std::fs::read_to_string(path)
                    .map_err(|source| ProvisionError::StyleFile { path: path.clone(), source })?;
                (SLD, sld)
            }
        };

        let url = format!("{}{}", self.base_url, step.path);
        debug!(method = ?step.method, %url, "sending map server request");
        let request = match step.method {
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
        };

        let response = request
            .basic_auth(&self.user, Some(&self.password))
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, XML)
            .body(body)
            .send()
            .map_err(|source| ProvisionError::Transport { step: step.name.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::Status { step: step.name.clone(), status: status.as_u16() });
        }
        Ok(())
    }
}
