//! Engine facade: top-level API for forward and back conversion.
//!
//! The `Converter` holds the configuration and hands every document a fresh
//! registry, so a failed conversion leaves nothing behind for the next one.

use serde::{Deserialize, Serialize};

use crate::backconvert::{BackConversion, BackConversionInput, BackConverter};
use crate::config::{ConverterConfig, TargetEncoding};
use crate::error::EnrichResult;
use crate::event::DocumentEvent;
use crate::format::DocumentFormat;
use crate::skeleton::builder::SkeletonBuilder;
use crate::skeleton::marker::MarkerResolver;
use crate::skeleton::{context, pointer};
use crate::span::{AnnotatedSpan, TextUnitRecord};

/// Result of a forward conversion: the two contexts and the unit records
/// linking them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardConversion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub skeleton_context: String,
    pub plain_text: String,
    pub units: Vec<TextUnitRecord>,
    /// Annotations the source document already carried inline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotatedSpan>,
}

impl ForwardConversion {
    /// Back-conversion input for this document, without annotations.
    pub fn to_back_input(&self) -> BackConversionInput {
        BackConversionInput {
            skeleton_context: self.skeleton_context.clone(),
            units: self.units.clone(),
            annotations: Vec::new(),
        }
    }
}

/// The document round-tripping converter.
pub struct Converter {
    config: ConverterConfig,
    encoding: TargetEncoding,
}

impl Converter {
    /// Create a converter, resolving the configured output encoding.
    pub fn new(config: ConverterConfig) -> EnrichResult<Self> {
        let encoding = config.target_encoding()?;
        tracing::debug!(
            encoding = %config.output_encoding,
            nfc = config.normalize_nfc,
            wrapper = %config.wrapper_element,
            "initializing converter"
        );
        Ok(Self { config, encoding })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Reject format requests no parser exists for.
    pub fn check_format(&self, request: &str) -> EnrichResult<DocumentFormat> {
        Ok(DocumentFormat::parse(request)?)
    }

    /// Convert one document's event stream into its skeleton and plain-text
    /// contexts.
    pub fn forward<'e, I>(&self, events: I) -> EnrichResult<ForwardConversion>
    where
        I: IntoIterator<Item = &'e DocumentEvent>,
    {
        let resolver = MarkerResolver::new(self.encoding, self.config.normalize_nfc);
        let mut builder = SkeletonBuilder::new(resolver);
        let mut event_count = 0usize;
        for event in events {
            builder.process(event)?;
            event_count += 1;
        }
        let registry = builder.finish();

        let resolved = pointer::resolve(&registry)?;
        let assembled = context::assemble(&registry, resolved)?;

        tracing::info!(
            events = event_count,
            entries = registry.entries().len(),
            units = assembled.units.len(),
            skeleton_len = assembled.skeleton_context.len(),
            plain_len = assembled.plain_text.len(),
            "forward conversion complete"
        );

        Ok(ForwardConversion {
            document_name: registry.document_name.clone(),
            locale: registry.locale.clone(),
            skeleton_context: assembled.skeleton_context,
            plain_text: assembled.plain_text,
            units: assembled.units,
            annotations: assembled.annotations,
        })
    }

    /// Rebuild the document, splicing in the input's annotations.
    pub fn back(&self, input: &BackConversionInput) -> EnrichResult<BackConversion> {
        let result = BackConverter::new(&self.config).convert(input)?;
        tracing::info!(
            annotations = input.annotations.len(),
            dropped = result.dropped.len(),
            document_len = result.document.len(),
            "back-conversion complete"
        );
        Ok(result)
    }
}
