// src/pipeline.rs

//! Multi-distribution ingestion run
//!
//! Distributions are processed concurrently on a bounded worker pool;
//! releases of one distribution run sequentially. A failing release is
//! recorded in the [`RunReport`] and excluded from matching, everything else
//! continues. Output is deterministic: distributions in configuration order,
//! components sorted by identifier.

use crate::appstream::ComponentSource;
use crate::config::Config;
use crate::distro::{DistroContext, DistroRetriever, ReleaseFailure, build_retrievers};
use crate::error::{Error, Result};
use crate::matcher::match_and_select;
use crate::sink::{SinkRecord, VersionSink};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Refresh caches before matching
    pub refresh: bool,
    /// Refresh even when the caches are younger than `max_age_secs`
    pub force: bool,
}

/// Outcome of one run
#[derive(Debug, Default)]
pub struct RunReport {
    pub records: Vec<SinkRecord>,
    pub failures: Vec<ReleaseFailure>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of one distribution, before it is handed to the sink
struct DistroOutcome {
    records: Vec<SinkRecord>,
    failures: Vec<ReleaseFailure>,
}

pub struct Pipeline {
    retrievers: Vec<Box<dyn DistroRetriever>>,
    components: Box<dyn ComponentSource>,
    pool: rayon::ThreadPool,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, components: Box<dyn ComponentSource>) -> Result<Self> {
        let context = DistroContext::new(Arc::clone(&config))?;
        let retrievers = build_retrievers(&context);
        Self::with_retrievers(config.jobs, retrievers, components)
    }

    pub fn with_retrievers(
        jobs: Option<usize>,
        retrievers: Vec<Box<dyn DistroRetriever>>,
        components: Box<dyn ComponentSource>,
    ) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = jobs {
            builder = builder.num_threads(jobs);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Config(format!("Cannot start worker pool: {}", e)))?;

        Ok(Self {
            retrievers,
            components,
            pool,
        })
    }

    pub fn retrievers(&self) -> &[Box<dyn DistroRetriever>] {
        &self.retrievers
    }

    /// Refresh every distribution without matching
    pub fn update(&self, force: bool) -> Vec<ReleaseFailure> {
        self.pool.install(|| {
            self.retrievers
                .par_iter()
                .flat_map_iter(|r| r.update_caches(force))
                .collect()
        })
    }

    /// Ingest every distribution and feed the selections to `sink`
    pub fn run(&self, options: RunOptions, sink: &mut dyn VersionSink) -> Result<RunReport> {
        let outcomes: Vec<DistroOutcome> = self.pool.install(|| {
            self.retrievers
                .par_iter()
                .map(|r| self.ingest_distro(r.as_ref(), options))
                .collect()
        });

        let mut report = RunReport::default();
        for outcome in outcomes {
            for record in &outcome.records {
                sink.accept(record)?;
            }
            report.records.extend(outcome.records);
            report.failures.extend(outcome.failures);
        }
        sink.finish()?;

        info!(
            "Selected {} component versions ({} failed releases)",
            report.records.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn ingest_distro(&self, retriever: &dyn DistroRetriever, options: RunOptions) -> DistroOutcome {
        let name = retriever.name().to_string();
        info!("Processing {}", name);

        let mut failures = if options.refresh {
            retriever.update_caches(options.force)
        } else {
            Vec::new()
        };

        let (suites, load_failures) = retriever.load_suites(&failures);
        failures.extend(load_failures);

        let components = match self.components.list_components(&retriever.metadata_dirs()) {
            Ok(components) => components,
            Err(e) => {
                warn!("{}: cannot list AppStream components: {}", name, e);
                failures.extend(
                    retriever
                        .distro()
                        .releases
                        .iter()
                        .map(|r| ReleaseFailure::new(&name, retriever.distro().release_tag(r), &e)),
                );
                return DistroOutcome {
                    records: Vec::new(),
                    failures,
                };
            }
        };

        let records = match_and_select(&components, &suites)
            .values()
            .map(|selection| SinkRecord::from_selection(&name, selection))
            .collect();

        DistroOutcome { records, failures }
    }
}
