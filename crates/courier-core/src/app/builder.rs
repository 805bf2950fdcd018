//! CourierBuilder - 構成からのワイヤリング
//!
//! Every collaborator defaults to the concrete implementation named by the
//! config and can be replaced before `build()` (tests swap in fakes).
//!
//! Fail-fast: HTTP clients are built up front and job registration errors
//! surface from `build()`, not from the first sweep.

use std::sync::Arc;

use thiserror::Error;

use super::channel::{DocumentChannel, HttpIngestChannel};
use super::driver::RetryDriver;
use super::enqueue::Enqueuer;
use super::resolver::ArtifactResolver;
use super::scheduler::{JobId, SchedulerError, SweepRegistry, SweepScheduler};
use crate::config::CourierConfig;
use crate::domain::{ExportFileRef, UploadBodyRef};
use crate::impls::{
    FsSourceRecordLookup, JsonArtifactBuilder, ReqwestUploadClient, TcpProbe, TelegramDocumentClient,
};
use crate::ports::{
    AlwaysOnline, ArtifactBuilder, Clock, Connectivity, DocumentChannelClient, HttpUploadClient,
    SettingsProvider, SourceRecordLookup, StaticSettings, SystemClock,
};
use crate::store::{FileOutboxStore, OutboxStore};

pub const DOCUMENT_JOB: &str = "document-outbox-sweep";
pub const HTTP_JOB: &str = "http-outbox-sweep";

pub type DocumentDriver = RetryDriver<ExportFileRef, DocumentChannel>;
pub type HttpDriver = RetryDriver<UploadBodyRef, HttpIngestChannel>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

pub struct CourierBuilder {
    config: CourierConfig,
    clock: Option<Arc<dyn Clock>>,
    settings: Option<Arc<dyn SettingsProvider>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    lookup: Option<Arc<dyn SourceRecordLookup>>,
    artifact_builder: Option<Arc<dyn ArtifactBuilder>>,
    document_client: Option<Arc<dyn DocumentChannelClient>>,
    upload_client: Option<Arc<dyn HttpUploadClient>>,
}

impl CourierBuilder {
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            clock: None,
            settings: None,
            connectivity: None,
            lookup: None,
            artifact_builder: None,
            document_client: None,
            upload_client: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn source_lookup(mut self, lookup: Arc<dyn SourceRecordLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn artifact_builder(mut self, builder: Arc<dyn ArtifactBuilder>) -> Self {
        self.artifact_builder = Some(builder);
        self
    }

    pub fn document_client(mut self, client: Arc<dyn DocumentChannelClient>) -> Self {
        self.document_client = Some(client);
        self
    }

    pub fn upload_client(mut self, client: Arc<dyn HttpUploadClient>) -> Self {
        self.upload_client = Some(client);
        self
    }

    pub fn build(self) -> Result<Courier, BuildError> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let settings = self
            .settings
            .unwrap_or_else(|| Arc::new(StaticSettings(config.channel_settings())));
        let connectivity: Arc<dyn Connectivity> = match (self.connectivity, &config.scheduler.connectivity_probe) {
            (Some(connectivity), _) => connectivity,
            (None, Some(target)) => Arc::new(TcpProbe::new(target.clone(), config.http_timeouts().connect)),
            (None, None) => Arc::new(AlwaysOnline),
        };
        let lookup = self
            .lookup
            .unwrap_or_else(|| Arc::new(FsSourceRecordLookup::new(config.source_dir.clone())));
        let artifact_builder = self
            .artifact_builder
            .unwrap_or_else(|| Arc::new(JsonArtifactBuilder));
        let document_client: Arc<dyn DocumentChannelClient> = match self.document_client {
            Some(client) => client,
            None => Arc::new(TelegramDocumentClient::new(
                config.document_api_base.clone(),
                config.http_timeouts(),
            )?),
        };
        let upload_client: Arc<dyn HttpUploadClient> = match self.upload_client {
            Some(client) => client,
            None => Arc::new(ReqwestUploadClient::new(
                config.ingest_path.clone(),
                config.http_timeouts(),
            )?),
        };

        let document_store: Arc<FileOutboxStore<ExportFileRef>> = Arc::new(FileOutboxStore::new(
            config.document_store_path(),
            Arc::clone(&clock),
        ));
        let http_store: Arc<FileOutboxStore<UploadBodyRef>> =
            Arc::new(FileOutboxStore::new(config.http_store_path(), Arc::clone(&clock)));

        let resolver = || {
            ArtifactResolver::new(
                config.export_dir.clone(),
                Arc::clone(&lookup),
                Arc::clone(&artifact_builder),
            )
        };
        let document_outbox: Arc<dyn OutboxStore<ExportFileRef>> = document_store.clone();
        let http_outbox: Arc<dyn OutboxStore<UploadBodyRef>> = http_store.clone();
        let document: Arc<DocumentDriver> = Arc::new(RetryDriver::new(
            document_outbox,
            DocumentChannel::new(document_client),
            resolver(),
            Arc::clone(&settings),
            config.document_policy(),
        ));
        let http: Arc<HttpDriver> = Arc::new(RetryDriver::new(
            http_outbox,
            HttpIngestChannel::new(upload_client),
            resolver(),
            Arc::clone(&settings),
            config.http_policy(),
        ));

        let mut registry = SweepRegistry::new();
        registry.register(JobId::new(DOCUMENT_JOB), document.clone())?;
        registry.register(JobId::new(HTTP_JOB), http.clone())?;
        let scheduler = Arc::new(SweepScheduler::new(
            registry,
            connectivity,
            config.scheduler_config(),
        ));

        Ok(Courier {
            config,
            document_store,
            http_store,
            document,
            http,
            scheduler,
        })
    }
}

/// The wired system: two stores, their drivers and one scheduler.
pub struct Courier {
    config: CourierConfig,
    document_store: Arc<FileOutboxStore<ExportFileRef>>,
    http_store: Arc<FileOutboxStore<UploadBodyRef>>,
    document: Arc<DocumentDriver>,
    http: Arc<HttpDriver>,
    scheduler: Arc<SweepScheduler>,
}

impl Courier {
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn document_store(&self) -> &Arc<FileOutboxStore<ExportFileRef>> {
        &self.document_store
    }

    pub fn http_store(&self) -> &Arc<FileOutboxStore<UploadBodyRef>> {
        &self.http_store
    }

    pub fn document_driver(&self) -> &Arc<DocumentDriver> {
        &self.document
    }

    pub fn http_driver(&self) -> &Arc<HttpDriver> {
        &self.http
    }

    pub fn scheduler(&self) -> &Arc<SweepScheduler> {
        &self.scheduler
    }

    pub fn document_enqueuer(&self) -> Enqueuer<ExportFileRef> {
        let store: Arc<dyn OutboxStore<ExportFileRef>> = self.document_store.clone();
        Enqueuer::new(store, JobId::new(DOCUMENT_JOB)).with_scheduler(Arc::clone(&self.scheduler))
    }

    pub fn http_enqueuer(&self) -> Enqueuer<UploadBodyRef> {
        let store: Arc<dyn OutboxStore<UploadBodyRef>> = self.http_store.clone();
        Enqueuer::new(store, JobId::new(HTTP_JOB)).with_scheduler(Arc::clone(&self.scheduler))
    }
}
