//! MCP server implementation using rmcp
//!
//! A thin adapter: it resolves document sources, hands bytes to the
//! [`Engine`] on the blocking pool and turns results into JSON.

use crate::cancel::CancelFlag;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Error;
use crate::fields::{flatten_profile, FieldKey};
use crate::labels::LabelDictionary;
use crate::model::{CoverMetadata, Region, Warning};
use crate::pdf::PdfiumBackend;
use crate::source::{resolve_base64, resolve_cache, resolve_path, OutputCache, ResolvedPdf};
use crate::store::TemplateStore;
use anyhow::{Context, Result};
use base64::Engine as _;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, service::RequestContext, tool, tool_handler, tool_router, RoleServer,
    ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a PDF comes from
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF data
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
    /// Reference to a filled output from an earlier call
    CacheRef {
        /// Cache key returned by fill_with_profile
        cache_key: String,
    },
}

impl<'de> serde::Deserialize<'de> for PdfSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\", \"base64\", or \"cache_key\", but got {}",
                match &value {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    _ => "unknown type",
                }
            )));
        };

        for key in ["path", "base64", "cache_key"] {
            let Some(v) = obj.get(key) else {
                continue;
            };
            let Some(s) = v.as_str() else {
                return Err(serde::de::Error::custom(format!(
                    "\"{}\" must be a string",
                    key
                )));
            };
            let s = s.to_string();
            return Ok(match key {
                "path" => PdfSource::Path { path: s },
                "base64" => PdfSource::Base64 { base64: s },
                _ => PdfSource::CacheRef { cache_key: s },
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of \"path\", \"base64\", or \"cache_key\", but got keys: {:?}",
            keys
        )))
    }
}

/// Sandbox, cache and engine configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories that path sources and output paths must stay within.
    /// Empty means unrestricted.
    pub resource_dirs: Vec<String>,
    /// Maximum total bytes of cached outputs (default: 256MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cached outputs (default: 64)
    pub cache_max_entries: usize,
    /// Engine tuning; defaults when `None`
    pub engine_config_path: Option<PathBuf>,
    /// Replacement label table; the bundled table when `None`
    pub labels_path: Option<PathBuf>,
    /// Directory holding the PDFium shared library
    pub pdfium_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            cache_max_bytes: 256 * 1024 * 1024, // 256MB
            cache_max_entries: 64,
            engine_config_path: None,
            labels_path: None,
            pdfium_dir: None,
        }
    }
}

impl ServerConfig {
    /// Build the engine this configuration describes
    pub fn build_engine(&self) -> Result<Engine> {
        let engine_config = match &self.engine_config_path {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading engine config {}", path.display()))?;
                EngineConfig::from_json(&json)?
            }
            None => EngineConfig::default(),
        };
        let labels = match &self.labels_path {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading label table {}", path.display()))?;
                LabelDictionary::from_json(&json)?
            }
            None => LabelDictionary::builtin()?,
        };
        let backend = match &self.pdfium_dir {
            Some(dir) => PdfiumBackend::with_library_dir(dir.clone()),
            None => PdfiumBackend::new(),
        };

        tracing::info!(
            labels_version = labels.version(),
            template_capacity = engine_config.template_capacity,
            "engine configured"
        );

        let store = Arc::new(TemplateStore::new(engine_config.template_capacity));
        Ok(Engine::new(Arc::new(backend), store, labels, engine_config))
    }
}

/// Tender autofill MCP server
#[derive(Clone)]
pub struct AutofillServer {
    engine: Engine,
    cache: Arc<OutputCache>,
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for extract_cover_metadata
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractCoverMetadataParams {
    /// Tender document whose first page is the cover
    pub source: PdfSource,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ExtractCoverMetadataResult {
    /// Source identifier
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CoverMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for extract_template_and_values
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractTemplateParams {
    /// The blank form as issued
    pub blank: PdfSource,
    /// The same form with values entered
    pub filled: PdfSource,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct ExtractTemplateResult {
    /// Source identifier of the filled form
    pub source: String,
    /// Detected values keyed by field key or `unmapped_<n>`
    pub field_values: BTreeMap<String, String>,
    /// Where each value sits on the page
    pub regions: BTreeMap<String, Region>,
    /// Zero-based pages with at least one inserted value
    pub pages_touched: Vec<usize>,
    pub total_differences: usize,
    /// Signature of the blank form
    pub signature: String,
    /// Whether a template stored by an earlier call named the values
    pub used_template: bool,
    /// Whether the server now holds a template for this blank
    pub template_stored: bool,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for fill_with_profile
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FillWithProfileParams {
    /// The blank form to fill
    pub blank: PdfSource,
    /// Company profile: a flat {field_key: value} object or the nested
    /// companyInfo/financialInfo/experienceInfo/technicalInfo shape
    pub profile: serde_json::Value,
    /// Explicit field regions, used when no template is stored for the blank
    #[serde(default)]
    pub regions: Option<BTreeMap<String, Region>>,
    /// Output file path (optional). If provided, saves the filled PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
    /// Return the filled PDF as base64 even when output_path is given
    #[serde(default)]
    pub include_base64: bool,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct FillWithProfileResult {
    /// Source identifier
    pub source: String,
    /// Cache key for the filled PDF, usable as {"cache_key": ...} in later calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    /// Path where PDF was saved (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    pub output_bytes: usize,
    pub warnings: Vec<Warning>,
    /// Profile keys outside the vocabulary or without a string value
    pub ignored_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for validate_completeness
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ValidateCompletenessParams {
    /// Company profile, flat or nested
    pub profile: serde_json::Value,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct ValidateCompletenessResult {
    pub is_valid: bool,
    /// Missing field keys in vocabulary order
    pub missing_fields: Vec<FieldKey>,
    pub ignored_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for list_templates
// ============================================================================

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListTemplatesParams {
    /// Include the stored region of every field
    #[serde(default)]
    pub include_regions: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct TemplateSummary {
    pub signature: String,
    pub fields: Vec<FieldKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<BTreeMap<String, Region>>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ListTemplatesResult {
    pub templates: Vec<TemplateSummary>,
    pub total_count: usize,
}

#[tool_router]
impl AutofillServer {
    /// Server with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ServerConfig::default())
    }

    /// Server whose engine is built from `config`
    pub fn with_config(config: ServerConfig) -> Result<Self> {
        let engine = config.build_engine()?;
        Ok(Self::with_engine(engine, config))
    }

    /// Server around an existing engine
    pub fn with_engine(engine: Engine, config: ServerConfig) -> Self {
        let cache = OutputCache::new(config.cache_max_entries, config.cache_max_bytes);
        Self {
            engine,
            cache: Arc::new(cache),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Read tender identification data from a cover page
    #[tool(
        description = "Read the title, reference number, issuing organization and date from the cover page (first page) of a tender document. Fields that are not found are returned empty; dates are ISO-8601 when they parse.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn extract_cover_metadata(
        &self,
        Parameters(params): Parameters<ExtractCoverMetadataParams>,
    ) -> String {
        let result = self
            .process_extract_cover_metadata(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "extract_cover_metadata failed");
                ExtractCoverMetadataResult {
                    source: Self::source_name(&params.source),
                    metadata: None,
                    error: Some(e.client_message()),
                }
            });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Diff a filled form against its blank
    #[tool(
        description = "Compare a filled tender form against the blank form it was made from and return the values that were added, keyed by profile field (company_name, tax_pin, ...). Values that cannot be attributed to a field are returned as unmapped_<n> with a warning.

The first successful extraction for a blank layout stores a template; later extractions of the same layout use it, and fill_with_profile can then fill that layout without coordinates.

Source format: each of blank/filled must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn extract_template_and_values(
        &self,
        Parameters(params): Parameters<ExtractTemplateParams>,
        context: RequestContext<RoleServer>,
    ) -> String {
        let cancel = CancelFlag::new();
        let watcher = {
            let cancel = cancel.clone();
            let ct = context.ct.clone();
            tokio::spawn(async move {
                ct.cancelled().await;
                cancel.cancel();
            })
        };

        let result = self
            .process_extract_template(&params, cancel)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "extract_template_and_values failed");
                ExtractTemplateResult {
                    source: Self::source_name(&params.filled),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });
        watcher.abort();

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Fill a blank form from a company profile
    #[tool(
        description = "Fill a blank tender form with values from a company profile. Uses the template stored for the blank's layout by extract_template_and_values; without one, explicit regions must be supplied as {field_key: {page_index, x, y, width, height}} in PDF points from the top-left corner.

The profile may be flat ({\"company_name\": \"...\"}) or nested ({\"companyInfo\": {\"companyName\": \"...\"}}). Values that do not fit their region are cut at the last full line and reported as warnings.

The output is always cached (output_cache_key) for chaining with other tools.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn fill_with_profile(
        &self,
        Parameters(params): Parameters<FillWithProfileParams>,
    ) -> String {
        let result = self
            .process_fill_with_profile(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "fill_with_profile failed");
                FillWithProfileResult {
                    source: Self::source_name(&params.blank),
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Check a profile for missing values
    #[tool(
        description = "Check a company profile against the 23 tender fields. Returns is_valid and the missing field keys in vocabulary order; blank or whitespace-only values count as missing."
    )]
    async fn validate_completeness(
        &self,
        Parameters(params): Parameters<ValidateCompletenessParams>,
    ) -> String {
        let result = self
            .process_validate_completeness(&params)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "validate_completeness failed");
                ValidateCompletenessResult {
                    error: Some(e.client_message()),
                    ..Default::default()
                }
            });

        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    /// List stored templates
    #[tool(
        description = "List the form templates learned so far, most recently used first, with the fields each one can fill."
    )]
    async fn list_templates(&self, Parameters(params): Parameters<ListTemplatesParams>) -> String {
        let result = self.process_list_templates(&params);
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }
}

impl AutofillServer {
    fn source_name(source: &PdfSource) -> String {
        match source {
            PdfSource::Path { path } => path.clone(),
            PdfSource::Base64 { .. } => "<base64>".to_string(),
            PdfSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    fn resolve_source(&self, source: &PdfSource) -> crate::error::Result<ResolvedPdf> {
        match source {
            PdfSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path)
            }
            PdfSource::Base64 { base64 } => resolve_base64(base64),
            PdfSource::CacheRef { cache_key } => resolve_cache(cache_key, &self.cache),
        }
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;
        self.within_resource_dirs(canonical, path)
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output file may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let path_obj = Path::new(path);
        let file_name = path_obj.file_name().ok_or_else(|| Error::PathAccessDenied {
            path: path.to_string(),
        })?;
        let parent = match path_obj.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let canonical_parent =
            std::fs::canonicalize(parent).map_err(|_| Error::PathAccessDenied {
                path: path.to_string(),
            })?;
        self.within_resource_dirs(canonical_parent.join(file_name), path)
    }

    fn within_resource_dirs(
        &self,
        canonical: PathBuf,
        requested: &str,
    ) -> crate::error::Result<PathBuf> {
        let allowed = self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|d| canonical.starts_with(&d))
                .unwrap_or(false)
        });
        if allowed {
            Ok(canonical)
        } else {
            Err(Error::PathAccessDenied {
                path: requested.to_string(),
            })
        }
    }

    /// Write output data to a file path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };
        let path = self.validate_output_path_access(path_str)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(&path, data)?;
        Ok(Some(path_str.clone()))
    }

    async fn process_extract_cover_metadata(
        &self,
        params: &ExtractCoverMetadataParams,
    ) -> crate::error::Result<ExtractCoverMetadataResult> {
        let resolved = self.resolve_source(&params.source)?;
        let source = resolved.source_name;
        let data = resolved.data;
        let engine = self.engine.clone();

        let metadata = tokio::task::spawn_blocking(move || engine.extract_cover_metadata(&data))
            .await
            .map_err(join_error)??;

        Ok(ExtractCoverMetadataResult {
            source,
            metadata: Some(metadata),
            error: None,
        })
    }

    pub async fn process_extract_template(
        &self,
        params: &ExtractTemplateParams,
        cancel: CancelFlag,
    ) -> crate::error::Result<ExtractTemplateResult> {
        let blank = self.resolve_source(&params.blank)?;
        let filled = self.resolve_source(&params.filled)?;
        let source = filled.source_name.clone();
        let engine = self.engine.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            engine.extract_template_and_values_with_cancel(&blank.data, &filled.data, &cancel)
        })
        .await
        .map_err(join_error)??;

        let used_template = outcome.used_template();
        let result = outcome.value;
        let note = result
            .is_empty()
            .then(|| "No differences found between the blank and filled documents".to_string());

        Ok(ExtractTemplateResult {
            source,
            field_values: result
                .field_values
                .iter()
                .map(|(slot, value)| (slot.to_string(), value.clone()))
                .collect(),
            regions: result
                .regions
                .iter()
                .map(|(slot, region)| (slot.to_string(), *region))
                .collect(),
            pages_touched: result.pages_touched,
            total_differences: result.total_differences,
            template_stored: self.engine.store().contains(&result.signature),
            signature: result.signature,
            used_template,
            warnings: outcome.warnings,
            note,
            error: None,
        })
    }

    pub async fn process_fill_with_profile(
        &self,
        params: &FillWithProfileParams,
    ) -> crate::error::Result<FillWithProfileResult> {
        let resolved = self.resolve_source(&params.blank)?;
        let source = resolved.source_name;
        let data = resolved.data;

        let (values, ignored_keys) = flatten_profile(&params.profile)?;
        let regions = params.regions.as_ref().map(parse_regions).transpose()?;
        let engine = self.engine.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            engine.fill_with_profile(&data, &values, regions.as_ref())
        })
        .await
        .map_err(join_error)??;

        let output = outcome.value;
        let output_path = self.write_output(&params.output_path, &output)?;
        let base64 = (params.include_base64 || output_path.is_none())
            .then(|| base64::engine::general_purpose::STANDARD.encode(&output));
        let output_bytes = output.len();
        let output_cache_key = self.cache.insert(output);

        Ok(FillWithProfileResult {
            source,
            output_cache_key,
            output_path,
            base64,
            output_bytes,
            warnings: outcome.warnings,
            ignored_keys,
            error: None,
        })
    }

    pub fn process_validate_completeness(
        &self,
        params: &ValidateCompletenessParams,
    ) -> crate::error::Result<ValidateCompletenessResult> {
        let (values, ignored_keys) = flatten_profile(&params.profile)?;
        let report = self.engine.validate_completeness(&values);
        Ok(ValidateCompletenessResult {
            is_valid: report.is_valid,
            missing_fields: report.missing_fields,
            ignored_keys,
            error: None,
        })
    }

    pub fn process_list_templates(&self, params: &ListTemplatesParams) -> ListTemplatesResult {
        let templates: Vec<TemplateSummary> = self
            .engine
            .store()
            .templates()
            .iter()
            .map(|t| TemplateSummary {
                signature: t.signature.clone(),
                fields: t.fields.keys().copied().collect(),
                regions: params.include_regions.then(|| {
                    t.fields
                        .iter()
                        .map(|(field, region)| (field.to_string(), *region))
                        .collect()
                }),
            })
            .collect();

        ListTemplatesResult {
            total_count: templates.len(),
            templates,
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Pdfium {
        reason: format!("Task join error: {}", e),
    }
}

fn parse_regions(
    regions: &BTreeMap<String, Region>,
) -> crate::error::Result<BTreeMap<FieldKey, Region>> {
    regions
        .iter()
        .map(|(key, region)| Ok((key.parse::<FieldKey>()?, *region)))
        .collect()
}

#[tool_handler]
impl ServerHandler for AutofillServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Tender autofill: learn where a tender form's fields are by comparing a filled \
                 copy with its blank (extract_template_and_values), then fill new copies of that \
                 form from a company profile (fill_with_profile)."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with the default configuration
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = AutofillServer::with_config(config)?;

    tracing::info!("Tender autofill server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
