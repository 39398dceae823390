//! Configuration persistence tests.
//!
//! These tests verify that converter settings survive a save + load cycle
//! and that a loaded configuration actually drives conversion.

use enrich_skeleton::annotation::InlineAnnotation;
use enrich_skeleton::config::ConverterConfig;
use enrich_skeleton::engine::Converter;
use enrich_skeleton::error::ConfigError;
use enrich_skeleton::event::{CodedText, DocumentEvent, TextFragment};
use enrich_skeleton::span::{AnnotatedSpan, Span};

#[test]
fn config_survives_save_and_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("converter.toml");

    let config = ConverterConfig {
        output_encoding: "iso-8859-1".into(),
        normalize_nfc: false,
        wrapper_element: "mark".into(),
        group_prefix: "x-".into(),
    };
    config.save(&path).unwrap();

    let loaded = ConverterConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = ConverterConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "wrapper_element = [unclosed").unwrap();
    let err = ConverterConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn loaded_config_drives_conversion() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("converter.toml");
    std::fs::write(
        &path,
        "output_encoding = \"us-ascii\"\nwrapper_element = \"mark\"\n",
    )
    .unwrap();

    let converter = Converter::new(ConverterConfig::load(&path).unwrap()).unwrap();
    let forward = converter
        .forward(&[DocumentEvent::TextFragment(TextFragment::block(
            "t",
            None,
            CodedText::plain("Zürich"),
        ))])
        .unwrap();
    assert_eq!(forward.skeleton_context, "Z&#xFC;rich");

    let mut input = forward.to_back_input();
    input.annotations.push(AnnotatedSpan::new(
        Span::new(0, 11),
        vec![InlineAnnotation::ident_ref("Z")],
    ));
    let back = converter.back(&input).unwrap();
    assert_eq!(back.document, "<mark its-ta-ident-ref=\"Z\">Z&#xFC;rich</mark>");
}
