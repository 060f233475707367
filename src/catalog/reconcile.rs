use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::{
    catalog::*,
    config::{Config, ConfigError},
};

/// Username of the identity created for unauthenticated access.
pub(crate) const ANONYMOUS_USER: &str = "anonymous";

/// Ordering and reference failures while building the catalog hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("geolevel '{level}' names parent '{parent}' for body '{body}' and target '{target}', but the parent has no legislative level yet")]
    MissingParentLevel { body: String, level: String, parent: String, target: String },
    #[error("subject '{subject}' has no catalog row")]
    MissingSubject { subject: String },
}

/// Row ids of everything the document declares, keyed by document id,
/// plus how many rows this run created.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub created: RowCounts,
    pub bodies: BTreeMap<String, LegislativeBodyId>,
    /// Keyed by canonical subject id; aliases have no entry.
    pub subjects: BTreeMap<String, SubjectId>,
    pub targets: BTreeMap<String, TargetId>,
    pub geolevels: BTreeMap<String, GeoLevelId>,
}

impl Reconciliation {
    #[inline] pub fn subject(&self, canonical: &str) -> Option<SubjectId> { self.subjects.get(canonical).copied() }

    #[inline] pub fn geolevel(&self, id: &str) -> Option<GeoLevelId> { self.geolevels.get(id).copied() }
}

fn log_outcome(kind: &str, name: &str, created: bool) {
    if created { info!("Created {kind} \"{name}\"") } else { debug!("{kind} \"{name}\" already exists") }
}

fn unresolved(kind: &'static str, id: &str) -> ConfigError {
    ConfigError::UnresolvedReference { kind, id: id.to_string() }
}

/// Create or look up every catalog row the document declares.
///
/// Runs bodies, subjects (aliases skipped), targets (aliases resolved), then each
/// geolevel in document order together with its legislative levels and defaults.
/// A parent geolevel must appear before its children. Re-running against the
/// same document creates nothing.
///
/// Also ensures the `anonymous` user exists. An existing anonymous user is left
/// untouched: catalog users carry no credentials, so there is no password to
/// set on creation or to reset on later runs.
pub fn reconcile(store: &mut dyn CatalogStore, config: &Config) -> Result<Reconciliation> {
    let mut out = Reconciliation::default();
    let aliases = config.aliases();

    for body in &config.bodies {
        let new = NewLegislativeBody {
            name: body.name.clone(),
            member: body.member.clone(),
            max_districts: body.max_districts,
        };
        let (row, created) = store.get_or_create_body(&new)
            .with_context(|| format!("Failed to reconcile legislative body '{}'", body.id))?;
        log_outcome("LegislativeBody", &row.name, created);
        if !created && (row.member != new.member || row.max_districts != new.max_districts) {
            warn!(body = %row.name, "existing legislative body differs from configuration; keeping stored row");
        }
        out.created.bodies += created as usize;
        out.bodies.insert(body.id.clone(), row.id);
    }

    for subject in config.subjects.iter().filter(|s| !aliases.is_alias(&s.id)) {
        let new = NewSubject {
            name: subject.id.clone(),
            display: subject.name.clone(),
            short_display: subject.short_name.clone(),
            is_displayed: subject.displayed,
            sort_key: subject.sort_key,
        };
        let (row, created) = store.get_or_create_subject(&new)
            .with_context(|| format!("Failed to reconcile subject '{}'", subject.id))?;
        log_outcome("Subject", &row.display, created);
        if !created && (row.display != new.display || row.short_display != new.short_display
            || row.is_displayed != new.is_displayed || row.sort_key != new.sort_key)
        {
            warn!(subject = %row.name, "existing subject differs from configuration; keeping stored row");
        }
        out.created.subjects += created as usize;
        out.subjects.insert(subject.id.clone(), row.id);
    }

    for target in &config.targets {
        let canonical = aliases.resolve(&target.subject_ref)
            .ok_or_else(|| ReconcileError::MissingSubject { subject: target.subject_ref.clone() })?;
        let subject = out.subject(canonical)
            .ok_or_else(|| ReconcileError::MissingSubject { subject: canonical.to_string() })?;

        let (row, created) = store.get_or_create_target(&NewTarget {
            subject,
            value: target.value,
            range1: target.range1,
            range2: target.range2,
        }).with_context(|| format!("Failed to reconcile target '{}'", target.id))?;
        log_outcome("Target", &target.id, created);
        out.created.targets += created as usize;
        out.targets.insert(target.id.clone(), row.id);
    }

    for geolevel in &config.geolevels {
        let _span = info_span!("geolevel", name = %geolevel.name).entered();

        let new = NewGeoLevel { name: geolevel.name.clone(), min_zoom: geolevel.min_zoom, sort_key: geolevel.sort_key };
        let (level, created) = store.get_or_create_geolevel(&new)
            .with_context(|| format!("Failed to reconcile geolevel '{}'", geolevel.id))?;
        log_outcome("GeoLevel", &level.name, created);
        if !created && (level.min_zoom != new.min_zoom || level.sort_key != new.sort_key) {
            warn!("existing geolevel differs from configuration; keeping stored row");
        }
        out.created.geolevels += created as usize;

        for usage in &geolevel.bodies {
            let body = *out.bodies.get(&usage.body_ref).ok_or_else(|| unresolved("LegislativeBody", &usage.body_ref))?;

            for legislative_target in &usage.targets {
                let target_ref = &legislative_target.target_ref;
                let target = *out.targets.get(target_ref).ok_or_else(|| unresolved("Target", target_ref))?;

                let parent = match &usage.parent_ref {
                    None => None,
                    Some(parent_ref) => {
                        let missing = || ReconcileError::MissingParentLevel {
                            body: usage.body_ref.clone(),
                            level: geolevel.id.clone(),
                            parent: parent_ref.clone(),
                            target: target_ref.clone(),
                        };
                        let parent_level = out.geolevel(parent_ref).ok_or_else(missing)?;
                        let parent = store.find_legislative_level(body, parent_level, target)?.ok_or_else(missing)?;
                        Some(parent.id)
                    }
                };

                let (row, created) = store.get_or_create_legislative_level(&NewLegislativeLevel {
                    body,
                    geolevel: level.id,
                    target,
                    parent,
                })?;
                log_outcome("LegislativeBody/GeoLevel mapping", &format!("{}/{}", usage.body_ref, level.name), created);
                if !created && row.parent != parent {
                    warn!(body = %usage.body_ref, "existing legislative level has a different parent; keeping stored row");
                }
                out.created.legislative_levels += created as usize;

                if legislative_target.is_default {
                    let created = store.set_default_target(body, target)?;
                    if created {
                        info!("Set default target for LegislativeBody \"{}\"", usage.body_ref);
                    } else {
                        debug!("Changed default target for LegislativeBody \"{}\"", usage.body_ref);
                    }
                    out.created.defaults += created as usize;
                }
            }
        }

        out.geolevels.insert(geolevel.id.clone(), level.id);
    }

    let (_, created) = store.get_or_create_user(ANONYMOUS_USER)?;
    log_outcome("User", ANONYMOUS_USER, created);
    out.created.users += created as usize;

    info!(created = out.created.total(), "Reconciled catalog hierarchy");
    Ok(out)
}
