//! Discovery of plugin manifests and their parallel parsing.
//!
//! Sources are scanned in a fixed precedence order: classpath roots, the custom
//! plugins directory, the bundled plugins directory, then the explicit plugin path
//! list. Each manifest is parsed on the blocking pool, at most `max_parse_workers`
//! at a time, and the results are folded into a [`LoadResult`] in discovery order.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::kernel::constants::{META_INF, PLATFORM_MANIFEST_SUFFIX, PLUGIN_MANIFEST};
use crate::kernel::error::{Error, Result};
use crate::manifest::document::{Base, DocumentLoader, DocumentLocation, LoadingContext};
use crate::manifest::reader;
use crate::manifest::resolver::{ManifestResolver, ResolverOptions};
use crate::plugin_system::descriptor::{Descriptor, DescriptorSource};
use crate::plugin_system::error::{LoadError, PluginSystemError};
use crate::plugin_system::load_result::LoadResult;
use crate::storage::config::LoaderSettings;
use crate::utils::fs::{find_files, is_archive, list_dir_sorted};

/// One manifest to parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJob {
    pub location: DocumentLocation,
    pub source: DescriptorSource,
    pub bundled: bool,
    /// Candidates guessed from a directory's archives may legitimately lack a manifest
    pub speculative: bool,
}

impl ParseJob {
    fn new(location: DocumentLocation, source: DescriptorSource, bundled: bool) -> Self {
        Self {
            location,
            source,
            bundled,
            speculative: false,
        }
    }
}

/// What parsing one job produced
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed(Descriptor),
    Missing,
    Failed {
        id: Option<String>,
        location: String,
        error: PluginSystemError,
    },
}

/// Parses one job. Runs on a blocking worker thread and leaves its interner empty.
pub fn parse_job(
    loader: &dyn DocumentLoader,
    context: &LoadingContext,
    options: ResolverOptions,
    job: &ParseJob,
) -> ParseOutcome {
    let outcome = parse_document(loader, context, options, job);
    reader::ParsingContext::clear();
    outcome
}

fn parse_document(
    loader: &dyn DocumentLoader,
    context: &LoadingContext,
    options: ResolverOptions,
    job: &ParseJob,
) -> ParseOutcome {
    let raw = match loader.load(context, &job.location) {
        Ok(raw) => raw,
        Err(e) if e.is_not_found() => return ParseOutcome::Missing,
        Err(e) => {
            return ParseOutcome::Failed {
                id: None,
                location: job.location.to_string(),
                error: e.into(),
            };
        }
    };
    let id = reader::declared_id(&raw);
    let resolver = ManifestResolver::new(loader, context, options);
    match resolver.resolve(raw, &job.location, job.source, job.bundled) {
        Ok(descriptor) => ParseOutcome::Parsed(descriptor),
        Err(error) => ParseOutcome::Failed {
            id,
            location: job.location.to_string(),
            error,
        },
    }
}

/// Finds and parses every manifest the settings point at
pub struct DescriptorLoader {
    document_loader: Arc<dyn DocumentLoader>,
    settings: Arc<LoaderSettings>,
}

impl DescriptorLoader {
    pub fn new(document_loader: Arc<dyn DocumentLoader>, settings: Arc<LoaderSettings>) -> Self {
        Self {
            document_loader,
            settings,
        }
    }

    /// Lists parse jobs in precedence order.
    pub fn discover(&self) -> Result<Vec<ParseJob>> {
        let mut jobs = Vec::new();

        for root in &self.settings.classpath_roots {
            let base = Base::Classpath(root.clone());
            let mut names = Vec::new();
            if let Some(prefix) = &self.settings.platform_prefix {
                names.push(format!("{}{}", prefix, PLATFORM_MANIFEST_SUFFIX));
            }
            names.push(PLUGIN_MANIFEST.to_string());
            for name in names {
                let relative = format!("{}/{}", META_INF, name);
                if root.join(&relative).is_file() {
                    jobs.push(ParseJob::new(
                        DocumentLocation::new(base.clone(), &relative),
                        DescriptorSource::Classpath,
                        true,
                    ));
                }
            }
        }

        self.discover_dir(&self.settings.plugins_dir, DescriptorSource::Custom, false, &mut jobs)?;
        self.discover_dir(&self.settings.bundled_plugins_dir, DescriptorSource::Bundled, true, &mut jobs)?;

        for path in &self.settings.extra_plugin_paths {
            if !path.exists() {
                log::warn!("Plugin path '{}' does not exist", path.display());
                continue;
            }
            discover_plugin(path, DescriptorSource::PathList, false, &mut jobs)?;
        }

        log::debug!("Discovered {} manifest candidate(s)", jobs.len());
        Ok(jobs)
    }

    fn discover_dir(&self, dir: &Path, source: DescriptorSource, bundled: bool, jobs: &mut Vec<ParseJob>) -> Result<()> {
        let entries = list_dir_sorted(dir).map_err(|e| Error::io(e, "list_plugins", dir.to_path_buf()))?;
        for entry in entries {
            discover_plugin(&entry, source, bundled, jobs)?;
        }
        Ok(())
    }

    /// Parses every job on the blocking pool and folds the outcomes into `result`.
    ///
    /// `disabled` ids come out of parsing with `enabled = false`, except ids listed in
    /// `essential`. The context is closed before returning, whatever the outcome.
    pub async fn load_into(
        &self,
        jobs: Vec<ParseJob>,
        result: &mut LoadResult,
        disabled: &BTreeSet<String>,
        essential: &BTreeSet<String>,
    ) -> Result<()> {
        let context = Arc::new(LoadingContext::new());
        let outcomes = self.parse_all(&jobs, &context).await;
        context.close();
        let outcomes = outcomes?;

        for (job, outcome) in jobs.iter().zip(outcomes) {
            match outcome {
                ParseOutcome::Parsed(mut descriptor) => {
                    if disabled.contains(&descriptor.id) {
                        if essential.contains(&descriptor.id) {
                            log::warn!("Essential plugin '{}' is listed as disabled; loading it anyway", descriptor.id);
                        } else {
                            descriptor.enabled = false;
                        }
                    }
                    let override_if_compatible = job.source == DescriptorSource::PathList;
                    result.add(descriptor, override_if_compatible);
                }
                ParseOutcome::Missing if job.speculative => {
                    log::debug!("No manifest in {}", job.location);
                }
                ParseOutcome::Missing => {
                    let location = job.location.to_string();
                    log::warn!("Manifest {} disappeared before it could be read", location);
                    result.record_error(LoadError::error(&location, "manifest not found"));
                }
                ParseOutcome::Failed { id, location, error } => {
                    log::error!("Cannot load plugin manifest {}: {}", location, error);
                    match id {
                        Some(id) => {
                            let mut incomplete = Descriptor::new(&id, job.bundled);
                            incomplete.incomplete = true;
                            incomplete.source = job.source;
                            incomplete.location = Some(job.location.clone());
                            result.add(incomplete, false);
                            result.record_error(LoadError::from_error(&id, &error));
                        }
                        None => result.record_error(LoadError::from_error(&location, &error)),
                    }
                }
            }
        }
        Ok(())
    }

    async fn parse_all(&self, jobs: &[ParseJob], context: &Arc<LoadingContext>) -> Result<Vec<ParseOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.settings.parse_workers()));
        let options = self.settings.resolver_options();
        let mut tasks = JoinSet::new();

        for (index, job) in jobs.iter().cloned().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::Worker(e.to_string()))?;
            let loader = Arc::clone(&self.document_loader);
            let context = Arc::clone(context);
            tasks.spawn_blocking(move || {
                let outcome = parse_job(loader.as_ref(), &context, options, &job);
                drop(permit);
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<ParseOutcome>> = (0..jobs.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined?;
            outcomes[index] = Some(outcome);
        }
        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or(ParseOutcome::Missing))
            .collect())
    }
}

/// Adds the job(s) for one plugin directory or archive.
fn discover_plugin(path: &Path, source: DescriptorSource, bundled: bool, jobs: &mut Vec<ParseJob>) -> Result<()> {
    let manifest = format!("{}/{}", META_INF, PLUGIN_MANIFEST);
    if is_archive(path) {
        jobs.push(ParseJob::new(
            DocumentLocation::new(Base::Archive(path.to_path_buf()), &manifest),
            source,
            bundled,
        ));
        return Ok(());
    }
    if !path.is_dir() {
        return Ok(());
    }
    if path.join(&manifest).is_file() {
        jobs.push(ParseJob::new(
            DocumentLocation::new(Base::Directory(path.to_path_buf()), &manifest),
            source,
            bundled,
        ));
        return Ok(());
    }

    // A plugin directory without its own manifest carries it in one of its archives.
    let lib = path.join("lib");
    let archives: Vec<PathBuf> = find_files(&lib, &|p: &Path| is_archive(p))
        .map_err(|e| Error::io(e, "list_plugin_archives", lib.clone()))?;
    for archive in archives {
        let mut job = ParseJob::new(
            DocumentLocation::new(Base::Archive(archive), &manifest),
            source,
            bundled,
        );
        job.speculative = true;
        jobs.push(job);
    }
    Ok(())
}
