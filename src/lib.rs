// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # enrich-skeleton
//!
//! Skeleton-based document round-tripping for annotation services.
//!
//! A structured document (HTML, XML, XLIFF, ODT) arrives as a stream of parser
//! events. The forward conversion turns it into two parallel contexts:
//!
//! - the **skeleton context**, a full-fidelity rendering of the document, and
//! - the **plain-text context**, the extractable text only,
//!
//! together with one record per text unit linking its span in both contexts.
//! NLP services annotate the plain text; the back-conversion splices their
//! annotations into the skeleton and rebuilds the document.
//!
//! ## Architecture
//!
//! - **Marker resolution** (`skeleton::marker`): coded text to escaped runs + inline annotations
//! - **Skeleton building** (`skeleton::builder`): events to skeleton entries and text units
//! - **Pointer resolution** (`skeleton::pointer`): placeholder substitution with offset tracking
//! - **Context assembly** (`skeleton::context`): the two contexts and their dual-offset spans
//! - **Back-conversion** (`backconvert`): annotation splicing and document reconstruction
//!
//! ## Library usage
//!
//! ```no_run
//! use enrich_skeleton::annotation::InlineAnnotation;
//! use enrich_skeleton::config::ConverterConfig;
//! use enrich_skeleton::engine::Converter;
//! use enrich_skeleton::event::{CodedText, DocumentEvent, TextFragment};
//! use enrich_skeleton::span::AnnotatedSpan;
//!
//! let converter = Converter::new(ConverterConfig::default()).unwrap();
//! let events = vec![DocumentEvent::TextFragment(TextFragment::block(
//!     "p1",
//!     Some("<p>[#$$self$]</p>"),
//!     CodedText::plain("Berlin is big"),
//! ))];
//! let forward = converter.forward(&events).unwrap();
//!
//! let mut input = forward.to_back_input();
//! input.annotations.push(AnnotatedSpan::new(
//!     forward.units[0].plain.clone(),
//!     vec![InlineAnnotation::ident_ref("http://dbpedia.org/resource/Berlin")],
//! ));
//! let back = converter.back(&input).unwrap();
//! println!("{}", back.document);
//! ```

pub mod annotation;
pub mod backconvert;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod format;
pub mod skeleton;
pub mod span;
