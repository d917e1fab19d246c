//! Run orchestration.
//!
//! [`Orchestrator`] ties the pieces together: it validates configuration
//! up front, prepares the base namespaces, runs the planned suite, tears
//! fixtures down and hands the outcomes to the aggregator.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use conformance_types::{
    ConformanceReport, FeatureRegistry, Implementation, ProfileName, ProfileRegistry,
};

use crate::aggregator::{aggregate, ReportHeader};
use crate::cancel::CancelToken;
use crate::catalog::{plan, PlannedTest, ProfileFilter, TestCatalog};
use crate::cluster::ClusterClient;
use crate::config::{ConformanceOptions, BASE_NAMESPACES};
use crate::error::{ClusterError, OrchestratorError, OrchestratorResult};
use crate::isolation::delete_namespace_and_wait;
use crate::resolver::{resolve, SupportedFeatureSet};
use crate::runner::SuiteRunner;

/// Drives one conformance run.
pub struct Orchestrator {
    options: ConformanceOptions,
    catalog: TestCatalog,
    cluster: Arc<dyn ClusterClient>,
    profiles: ProfileRegistry,
    supported: SupportedFeatureSet,
    requested: BTreeSet<ProfileName>,
    implementation: Option<Implementation>,
}

impl Orchestrator {
    /// Validate `options` against the built-in registries.
    ///
    /// No cluster call is made; configuration errors surface here.
    pub fn new(
        options: ConformanceOptions,
        catalog: TestCatalog,
        cluster: Arc<dyn ClusterClient>,
    ) -> OrchestratorResult<Self> {
        Self::with_registries(
            options,
            catalog,
            cluster,
            &FeatureRegistry::builtin(),
            ProfileRegistry::builtin(),
        )
    }

    pub fn with_registries(
        options: ConformanceOptions,
        catalog: TestCatalog,
        cluster: Arc<dyn ClusterClient>,
        features: &FeatureRegistry,
        profiles: ProfileRegistry,
    ) -> OrchestratorResult<Self> {
        options.validate()?;

        let supported = resolve(
            &options.supported_features,
            &options.exempt_features,
            options.enable_all_features,
            options.channel,
            features,
        )?;

        let requested = profiles.parse_requested(&options.conformance_profiles)?;
        let implementation = if requested.is_empty() {
            None
        } else {
            let meta = &options.implementation;
            Some(Implementation::parse(
                &meta.organization,
                &meta.project,
                &meta.url,
                &meta.version,
                &meta.contact,
            )?)
        };

        info!(
            gateway_class = %options.gateway_class,
            supported = %supported,
            profiles = ?requested,
            tests = catalog.len(),
            "conformance configuration validated"
        );

        Ok(Self {
            options,
            catalog,
            cluster,
            profiles,
            supported,
            requested,
            implementation,
        })
    }

    pub fn supported(&self) -> &SupportedFeatureSet {
        &self.supported
    }

    pub fn requested_profiles(&self) -> &BTreeSet<ProfileName> {
        &self.requested
    }

    pub fn options(&self) -> &ConformanceOptions {
        &self.options
    }

    /// Decide which catalog entries run.
    pub fn plan(&self) -> Vec<PlannedTest> {
        let filter = ProfileFilter {
            registry: &self.profiles,
            requested: &self.requested,
        };
        plan(&self.catalog, &self.supported, &filter, &self.options.skip_tests)
    }

    /// Verify connectivity and create the base namespaces.
    pub async fn setup(&self) -> OrchestratorResult<()> {
        self.cluster
            .check_connection()
            .await
            .map_err(OrchestratorError::ClusterSetup)?;

        for namespace in BASE_NAMESPACES {
            match self
                .cluster
                .create_namespace(namespace, &self.options.namespace_labels)
                .await
            {
                Ok(()) => debug!(namespace, "created base namespace"),
                Err(ClusterError::AlreadyExists(_)) => debug!(namespace, "reusing base namespace"),
                Err(err) => return Err(OrchestratorError::ClusterSetup(err)),
            }
        }

        info!(namespaces = BASE_NAMESPACES.len(), "base resources ready");
        Ok(())
    }

    /// Run the suite and build the report.
    ///
    /// Cancellation before the first test is an error. Cancellation during
    /// the run still yields a report whose unfinished tests are skipped; the
    /// caller can tell by checking its token. A fatal cluster error mid-run
    /// yields a report with `aborted` set.
    pub async fn run(&self, cancel: CancelToken) -> OrchestratorResult<ConformanceReport> {
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let date = Utc::now();
        let planned = self.plan();
        let runner =
            SuiteRunner::new(Arc::clone(&self.cluster), self.supported.clone(), &self.options);
        let record = runner.run(planned, cancel).await;

        if self.options.cleanup {
            self.teardown(&runner).await;
        } else {
            info!("cleanup disabled; leaving base namespaces and isolation units in place");
        }

        if let Some(reason) = &record.aborted {
            error!(%reason, "run aborted; report is best-effort");
        }

        Ok(aggregate(
            &record.outcomes,
            &self.profiles,
            &self.requested,
            &self.supported,
            ReportHeader {
                date,
                gateway_class: self.options.gateway_class.clone(),
                implementation: self.implementation.clone(),
                aborted: record.aborted,
            },
        ))
    }

    async fn teardown(&self, runner: &SuiteRunner) {
        for (namespace, err) in runner.arena().release_all().await {
            warn!(%namespace, %err, "isolation unit left behind");
        }

        let timeouts = runner.timeouts();
        for namespace in BASE_NAMESPACES {
            if let Err(err) = delete_namespace_and_wait(
                self.cluster.as_ref(),
                namespace,
                timeouts.teardown,
                timeouts.poll_interval,
            )
            .await
            {
                warn!(namespace, %err, "failed to delete base namespace");
            }
        }
        debug!("teardown complete");
    }
}
