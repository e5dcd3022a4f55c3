//! Engine facade: the four host-facing operations over a document backend

use crate::align::align;
use crate::cancel::CancelFlag;
use crate::cluster::cluster;
use crate::config::EngineConfig;
use crate::diff::diff;
use crate::error::{Error, Result};
use crate::fields::{validate_completeness, CompletenessReport, FieldKey};
use crate::fill::layout;
use crate::identify::identify;
use crate::labels::LabelDictionary;
use crate::model::{CoverMetadata, Document, ExtractionResult, Outcome, Region, Template, Warning};
use crate::pdf::PdfBackend;
use crate::scanner::scan_cover_page;
use crate::signature::signature;
use crate::store::TemplateStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Differential extraction and template filling over one backend, one
/// label dictionary and one (shared) template store
#[derive(Clone)]
pub struct Engine {
    backend: Arc<dyn PdfBackend>,
    store: Arc<TemplateStore>,
    labels: Arc<LabelDictionary>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        backend: Arc<dyn PdfBackend>,
        store: Arc<TemplateStore>,
        labels: LabelDictionary,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            store,
            labels: Arc::new(labels),
            config,
        }
    }

    /// Engine with the bundled label table, default tuning and a fresh store
    pub fn with_backend(backend: Arc<dyn PdfBackend>) -> Result<Self> {
        let config = EngineConfig::default();
        let store = Arc::new(TemplateStore::new(config.template_capacity));
        Ok(Self::new(backend, store, LabelDictionary::builtin()?, config))
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    pub fn labels(&self) -> &LabelDictionary {
        &self.labels
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn load(&self, data: &[u8], cancel: &CancelFlag) -> Result<Document> {
        let document = self.backend.extract(data, cancel)?;
        if document.pages.is_empty() {
            return Err(Error::EmptyDocument);
        }
        Ok(document)
    }

    /// Signature of a blank document, as used for template lookup
    pub fn signature_of(&self, blank: &[u8]) -> Result<String> {
        Ok(signature(&self.load(blank, &CancelFlag::new())?))
    }

    /// Stored template for a blank document, if one exists
    pub fn template_for(&self, blank: &[u8]) -> Result<Option<Arc<Template>>> {
        Ok(self.store.get(&self.signature_of(blank)?))
    }

    /// Title, reference number, issuing body and date from the first page
    pub fn extract_cover_metadata(&self, data: &[u8]) -> Result<CoverMetadata> {
        let document = self.load(data, &CancelFlag::new())?;
        let page = document.page(0).ok_or(Error::EmptyDocument)?;
        let meta = scan_cover_page(page, &self.labels, &self.config);
        info!(
            found_title = !meta.title.is_empty(),
            found_reference = !meta.reference_number.is_empty(),
            "extracted cover metadata"
        );
        Ok(meta)
    }

    /// Compare `filled` against `blank` and name the values that were added.
    ///
    /// When no template is stored for the blank's signature, a new one is
    /// built from label proximity and stored, provided at least one field
    /// was identified.
    pub fn extract_template_and_values(
        &self,
        blank: &[u8],
        filled: &[u8],
    ) -> Result<Outcome<ExtractionResult>> {
        self.extract_template_and_values_with_cancel(blank, filled, &CancelFlag::new())
    }

    /// [`Self::extract_template_and_values`], abandoned with
    /// [`Error::Cancelled`] once `cancel` is set. A cancelled run never
    /// writes to the template store.
    pub fn extract_template_and_values_with_cancel(
        &self,
        blank: &[u8],
        filled: &[u8],
        cancel: &CancelFlag,
    ) -> Result<Outcome<ExtractionResult>> {
        let blank_doc = self.load(blank, cancel)?;
        let filled_doc = self.load(filled, cancel)?;
        let signature = signature(&blank_doc);

        let aligned = align(&blank_doc, &filled_doc, &self.config, cancel)?;
        let mut warnings = aligned.warnings;

        let mut insertions = Vec::new();
        for pair in &aligned.value {
            cancel.check()?;
            insertions.extend(diff(pair.blank, &pair.filled, &self.config));
        }

        let clusters = cluster(&insertions, &self.config);
        debug!(
            insertions = insertions.len(),
            clusters = clusters.len(),
            "clustered insertions"
        );

        let known = self.store.get(&signature);
        if known.is_some() {
            warnings.push(Warning::StoredTemplateApplied {
                signature: signature.clone(),
            });
        }
        let identified = identify(
            &clusters,
            &blank_doc,
            known.as_deref(),
            &self.labels,
            &self.config,
        );
        warnings.extend(identified.warnings);
        let identified = identified.value;

        let pages_touched: Vec<usize> = clusters
            .iter()
            .map(|c| c.page_index())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if known.is_none() && !clusters.is_empty() {
            if identified.fields.is_empty() {
                warnings.push(Warning::TemplateNotStored {
                    signature: signature.clone(),
                });
            } else {
                cancel.check()?;
                self.store.put(
                    signature.clone(),
                    Template {
                        signature: signature.clone(),
                        fields: identified.fields.clone(),
                    },
                );
                info!(
                    signature = %signature,
                    fields = identified.fields.len(),
                    "stored template"
                );
            }
        }

        let result = ExtractionResult {
            field_values: identified.values,
            regions: identified.regions,
            pages_touched,
            total_differences: clusters.len(),
            inserted_tokens: insertions.len(),
            signature,
        };

        info!(
            differences = result.total_differences,
            mapped = result.mapped_values().len(),
            warnings = warnings.len(),
            used_template = known.is_some(),
            "extracted values"
        );
        Ok(Outcome::new(result, warnings))
    }

    /// Draw `values` into explicit `regions` on `blank`
    pub fn fill(
        &self,
        blank: &[u8],
        regions: &BTreeMap<FieldKey, Region>,
        values: &BTreeMap<FieldKey, String>,
    ) -> Result<Outcome<Vec<u8>>> {
        let blank_doc = self.load(blank, &CancelFlag::new())?;
        self.render(&blank_doc, blank, regions, values)
    }

    /// Fill `blank` using the stored template for its signature, falling
    /// back to `explicit` coordinates
    pub fn fill_with_profile(
        &self,
        blank: &[u8],
        values: &BTreeMap<FieldKey, String>,
        explicit: Option<&BTreeMap<FieldKey, Region>>,
    ) -> Result<Outcome<Vec<u8>>> {
        let blank_doc = self.load(blank, &CancelFlag::new())?;
        let signature = signature(&blank_doc);

        match (self.store.get(&signature), explicit) {
            (Some(template), _) => {
                debug!(signature = %signature, "filling from stored template");
                self.render(&blank_doc, blank, &template.fields, values)
            }
            (None, Some(regions)) => {
                debug!(signature = %signature, "filling from explicit coordinates");
                self.render(&blank_doc, blank, regions, values)
            }
            (None, None) => Err(Error::NoTemplateAvailable { signature }),
        }
    }

    fn render(
        &self,
        blank_doc: &Document,
        blank: &[u8],
        regions: &BTreeMap<FieldKey, Region>,
        values: &BTreeMap<FieldKey, String>,
    ) -> Result<Outcome<Vec<u8>>> {
        let placed = layout(blank_doc, regions, values, &self.config);
        let bytes = self.backend.render(blank, &placed.value)?;
        info!(
            lines = placed.value.len(),
            warnings = placed.warnings.len(),
            bytes = bytes.len(),
            "filled document"
        );
        Ok(Outcome::new(bytes, placed.warnings))
    }

    /// Which vocabulary fields `values` leaves blank
    pub fn validate_completeness(&self, values: &BTreeMap<FieldKey, String>) -> CompletenessReport {
        validate_completeness(values)
    }
}
