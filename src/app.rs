use std::fmt;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::document::{DigitalDocument, DocumentSummary, NodeId};
use crate::domain::RecordId;
use crate::error::MigrateError;
use crate::http::{ImageClient, RecordFetcher};
use crate::images::{ImageFetcher, ImageReport};
use crate::linker::{LinkReport, ReferenceLinker, aggregate_pages};
use crate::logical::{LogicalBuild, LogicalTreeBuilder};
use crate::mets::{MetsSections, RecordEnvelope, parse_envelope};
use crate::mods::{ExtractReport, MetadataExtractor};
use crate::physical::PhysicalTreeBuilder;
use crate::ruleset::Ruleset;
use crate::store::{FINAL_URL_PROPERTY, ProcessInit, Store};
use crate::xml::Element;

pub const JOURNAL_SOURCE: &str = "METS Migration";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetching,
    Resetting,
    Sectioning,
    BuildingPhysical,
    BuildingLogical,
    Linking,
    Aggregating,
    Writing,
    FetchingImages,
    Done,
}

impl Phase {
    pub const ALL: [Phase; 10] = [
        Phase::Fetching,
        Phase::Resetting,
        Phase::Sectioning,
        Phase::BuildingPhysical,
        Phase::BuildingLogical,
        Phase::Linking,
        Phase::Aggregating,
        Phase::Writing,
        Phase::FetchingImages,
        Phase::Done,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Fetching => "Fetch",
            Phase::Resetting => "Reset",
            Phase::Sectioning => "Section",
            Phase::BuildingPhysical => "Physical",
            Phase::BuildingLogical => "Logical",
            Phase::Linking => "Link",
            Phase::Aggregating => "Aggregate",
            Phase::Writing => "Write",
            Phase::FetchingImages => "Images",
            Phase::Done => "Done",
        }
    }

    pub fn index(self) -> usize {
        Phase::ALL
            .iter()
            .position(|phase| *phase == self)
            .unwrap_or_default()
    }

    pub fn parse_event(message: &str) -> Option<(Phase, &str)> {
        let rest = message.strip_prefix("phase=")?;
        let (label, detail) = rest.split_once(';').unwrap_or((rest, ""));
        Phase::ALL
            .into_iter()
            .find(|phase| phase.label() == label.trim())
            .map(|phase| (phase, detail.trim()))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub severity: Severity,
    pub message: String,
    pub source: &'static str,
}

impl JournalEntry {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            source: JOURNAL_SOURCE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    fn journal(&self, _entry: JournalEntry) {}
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub skip_images: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub identifier: String,
    pub record_url: String,
    pub raw_record: String,
    pub imported_at: String,
    pub imported: bool,
    pub anchor_metadata: Option<ExtractReport>,
    pub logical: LogicalBuild,
    pub pages: usize,
    pub links: LinkReport,
    pub aggregated: usize,
    pub images: Option<ImageReport>,
    pub document: DocumentSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub process_dir: String,
    pub title: String,
    pub document: DocumentSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub process_dir: String,
    pub media_dir: String,
    pub document: DocumentSummary,
}

#[derive(Clone)]
pub struct App<F: RecordFetcher, I: ImageClient> {
    store: Store,
    fetcher: F,
    images: I,
}

impl<F: RecordFetcher, I: ImageClient> App<F, I> {
    pub fn new(store: Store, fetcher: F, images: I) -> Self {
        Self {
            store,
            fetcher,
            images,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn import(
        &self,
        config: &ResolvedConfig,
        ruleset: &Ruleset,
        options: ImportOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, MigrateError> {
        let result = self.run_import(config, ruleset, options, sink);
        if let Err(err) = &result {
            sink.journal(JournalEntry::new(
                Severity::Error,
                format!("Error during import: {err}"),
            ));
        }
        result
    }

    fn run_import(
        &self,
        config: &ResolvedConfig,
        ruleset: &Ruleset,
        options: ImportOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, MigrateError> {
        let started = Instant::now();
        let progress = |phase: Phase, detail: String| {
            sink.event(ProgressEvent {
                message: format!("phase={phase}; {detail}"),
                elapsed: Some(started.elapsed()),
            });
        };

        let mut document = self.store.load_document()?;
        let properties = self.store.load_properties()?;
        let media_dir = self.media_dir(&properties.title, &config.identifier);

        progress(Phase::Fetching, format!("record {}", config.identifier));
        tracing::info!("get data for record {}", config.identifier);
        let record_url = config.record_url(&config.identifier);
        let record = self
            .fetch_record(&config.identifier, &record_url, sink)?
            .ok_or_else(|| MigrateError::RecordNotFound(config.identifier.to_string()))?;
        let anchor_record = config
            .anchor_identifier
            .as_ref()
            .and_then(|anchor_id| self.fetch_anchor(config, anchor_id, sink));

        progress(Phase::Resetting, "clearing previous import".to_string());
        document.reset_for_import(ruleset)?;
        let (target, anchor) = document.import_target(ruleset)?;

        let anchor_metadata = match (anchor_record, &config.anchor_identifier) {
            (Some(anchor_record), Some(anchor_id)) => {
                apply_anchor(&mut document, anchor, &anchor_record, anchor_id, ruleset)
            }
            _ => None,
        };

        progress(Phase::Sectioning, "splitting record".to_string());
        let sections = MetsSections::from_record(&record);

        let mut logical = LogicalBuild::default();
        let mut links = LinkReport::default();
        let imported = match sections.physical {
            Some(struct_map) => {
                progress(Phase::BuildingPhysical, "pages".to_string());
                let pages = PhysicalTreeBuilder::new(ruleset, &sections.images).build(
                    &mut document,
                    struct_map,
                    media_dir.as_str(),
                );

                progress(Phase::BuildingLogical, "structure".to_string());
                match sections.logical {
                    Some(logical_map) => {
                        logical = LogicalTreeBuilder::new(ruleset, &sections).build(
                            &mut document,
                            target,
                            logical_map,
                        );
                    }
                    None => tracing::warn!("record {} has no logical structure", config.identifier),
                }

                progress(Phase::Linking, format!("{} links", sections.struct_links.len()));
                links = ReferenceLinker::new(&logical.nodes, &pages)
                    .link(&mut document, &sections.struct_links);
                true
            }
            None => {
                tracing::info!(
                    "record {} has no physical structure, nothing to import",
                    config.identifier
                );
                false
            }
        };

        progress(Phase::Aggregating, "assigning pages to top element".to_string());
        let aggregated = aggregate_pages(&mut document, target);

        progress(Phase::Writing, self.store.document_path().to_string());
        self.store.write_document(&document)?;
        self.store.set_property(FINAL_URL_PROPERTY, &record_url)?;

        let images = if imported && !options.skip_images {
            progress(
                Phase::FetchingImages,
                format!("{} images into {media_dir}", sections.images.len()),
            );
            let fetcher = ImageFetcher::new(&self.images, config.image_retry_delay);
            Some(fetcher.fetch_all(&sections.images, &media_dir)?)
        } else {
            None
        };

        progress(Phase::Done, format!("record {}", config.identifier));
        Ok(ImportResult {
            identifier: config.identifier.to_string(),
            raw_record: self.store.raw_record_path(&config.identifier).to_string(),
            imported_at: chrono::Utc::now().to_rfc3339(),
            record_url,
            imported,
            anchor_metadata,
            pages: document.pages().len(),
            logical,
            links,
            aggregated,
            images,
            document: document.summary(),
        })
    }

    pub fn show(&self, sink: &dyn ProgressSink) -> Result<ShowResult, MigrateError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading {}", self.store.document_path()),
            elapsed: None,
        });
        let document = self.store.load_document()?;
        let properties = self.store.load_properties()?;
        Ok(ShowResult {
            process_dir: self.store.process_root().to_string(),
            title: properties.title,
            document: document.summary(),
        })
    }

    pub fn init(
        &self,
        init: &ProcessInit,
        ruleset: &Ruleset,
        sink: &dyn ProgressSink,
    ) -> Result<InitResult, MigrateError> {
        sink.event(ProgressEvent {
            message: format!("phase=Store; creating {}", self.store.document_path()),
            elapsed: None,
        });
        let document = self.store.init_document(init, ruleset)?;
        Ok(InitResult {
            process_dir: self.store.process_root().to_string(),
            media_dir: self.store.media_dir(&init.title).to_string(),
            document: document.summary(),
        })
    }

    fn media_dir(&self, title: &str, identifier: &RecordId) -> Utf8PathBuf {
        if title.trim().is_empty() {
            self.store.media_dir(&identifier.file_stem())
        } else {
            self.store.media_dir(title.trim())
        }
    }

    /// `Ok(None)` when the endpoint answered without a record.
    fn fetch_record(
        &self,
        id: &RecordId,
        url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Option<Element>, MigrateError> {
        sink.journal(JournalEntry::new(Severity::Debug, format!("Requesting {url}")));
        let xml = self.fetcher.fetch_xml(url).inspect_err(|err| {
            tracing::error!("fetching record {id} failed: {err}");
        })?;
        let raw = self.store.write_raw_record(id, &xml)?;
        tracing::debug!("stored record {id} at {raw}");

        match parse_envelope(&xml)? {
            RecordEnvelope::Record(mets) => Ok(Some(mets)),
            RecordEnvelope::NoRecord(reason) => {
                sink.journal(JournalEntry::new(
                    Severity::Error,
                    format!("No record found for ID {id}: {reason}"),
                ));
                Ok(None)
            }
        }
    }

    fn fetch_anchor(
        &self,
        config: &ResolvedConfig,
        anchor_id: &RecordId,
        sink: &dyn ProgressSink,
    ) -> Option<Element> {
        match self.fetch_record(anchor_id, &config.record_url(anchor_id), sink) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!("anchor record {anchor_id} unavailable: {err}");
                sink.journal(JournalEntry::new(
                    Severity::Warn,
                    format!("Anchor record {anchor_id} could not be fetched: {err}"),
                ));
                None
            }
        }
    }
}

fn apply_anchor(
    document: &mut DigitalDocument,
    anchor: Option<NodeId>,
    anchor_record: &Element,
    anchor_id: &RecordId,
    ruleset: &Ruleset,
) -> Option<ExtractReport> {
    let Some(anchor) = anchor else {
        tracing::warn!("document has no anchor, ignoring anchor record {anchor_id}");
        return None;
    };
    let sections = MetsSections::from_record(anchor_record);
    let dmd_id = format!("md{anchor_id}");
    match sections.mods(&dmd_id) {
        Some(mods) => Some(MetadataExtractor::new(ruleset).extract(mods, document, anchor)),
        None => {
            tracing::warn!("anchor record {anchor_id} has no section {dmd_id}");
            None
        }
    }
}
