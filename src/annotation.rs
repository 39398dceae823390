//! Inline annotations produced by upstream NLP services.
//!
//! Annotations arrive as logical key/value statements (`taClassRef`,
//! `termConfidence`, ...). They are grouped into one closed variant per ITS
//! data category and converted back into generic `{name, value}` statements,
//! named after the HTML ITS local attributes, when spliced into markup.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// A typed annotation value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnnotationValue {
    String(String),
    Iri(String),
    Boolean(bool),
    Integer(i64),
    UnsignedInteger(u64),
    Double(f64),
}

impl AnnotationValue {
    /// Render as attribute text. Booleans use the ITS `yes`/`no` convention.
    pub fn render(&self) -> String {
        match self {
            Self::String(s) | Self::Iri(s) => s.clone(),
            Self::Boolean(true) => "yes".into(),
            Self::Boolean(false) => "no".into(),
            Self::Integer(i) => i.to_string(),
            Self::UnsignedInteger(u) => u.to_string(),
            Self::Double(d) => d.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Integer(i) => Some(*i as f64),
            Self::UnsignedInteger(u) => Some(*u as f64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UnsignedInteger(u) => Some(*u),
            Self::Integer(i) => u64::try_from(*i).ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::String(s) => match s.trim() {
                "yes" | "true" => Some(true),
                "no" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A generic attribute statement, the form consumed by attribute grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// HTML ITS attribute name (e.g. `its-ta-class-ref`).
    pub name: String,
    pub value: AnnotationValue,
}

impl Statement {
    pub fn new(name: impl Into<String>, value: AnnotationValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Text analysis: entity linking and classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
}

/// Terminology: the span is a term, optionally linked to a term base entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terminology {
    #[serde(default = "default_term")]
    pub term: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

fn default_term() -> bool {
    true
}

impl Default for Terminology {
    fn default() -> Self {
        Self {
            term: default_term(),
            info_ref: None,
            confidence: None,
        }
    }
}

/// Localization quality issue and rating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocQuality {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_ref: Option<String>,
}

/// Who or what produced or revised the content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev_person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev_org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prov_ref: Option<String>,
}

/// An annotation attached to a plain-text span, one variant per ITS category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum InlineAnnotation {
    TextAnalysis(TextAnalysis),
    Terminology(Terminology),
    Quality(LocQuality),
    MtConfidence { confidence: f64 },
    Provenance(Provenance),
    AnnotatorsRef { reference: String },
    StorageSize {
        size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encoding: Option<String>,
    },
    /// Anything without a dedicated category; `name` is the attribute name.
    Generic { name: String, value: AnnotationValue },
}

impl InlineAnnotation {
    /// Entity link (`its-ta-ident-ref`).
    pub fn ident_ref(iri: impl Into<String>) -> Self {
        Self::TextAnalysis(TextAnalysis {
            ident_ref: Some(iri.into()),
            ..Default::default()
        })
    }

    /// Entity class (`its-ta-class-ref`).
    pub fn class_ref(iri: impl Into<String>) -> Self {
        Self::TextAnalysis(TextAnalysis {
            class_ref: Some(iri.into()),
            ..Default::default()
        })
    }

    /// Text analysis confidence (`its-ta-confidence`).
    pub fn confidence(value: f64) -> Self {
        Self::TextAnalysis(TextAnalysis {
            confidence: Some(value),
            ..Default::default()
        })
    }

    /// Map one logical key/value statement into its category.
    ///
    /// Keys may be bare (`taClassRef`), prefixed (`itsrdf:taClassRef`) or full
    /// IRIs. Unknown keys, and values of the wrong type for their key, become
    /// [`InlineAnnotation::Generic`] with a kebab-cased `its-` attribute name.
    pub fn from_key_value(key: &str, value: AnnotationValue) -> Self {
        let local = local_name(key);
        let text = || Some(value.render());

        let mapped = match local {
            "taIdentRef" | "identReference" | "entity" => Some(Self::TextAnalysis(TextAnalysis {
                ident_ref: text(),
                ..Default::default()
            })),
            "taClassRef" | "classReference" => Some(Self::TextAnalysis(TextAnalysis {
                class_ref: text(),
                ..Default::default()
            })),
            "taConfidence" | "confidence" => value.as_f64().map(Self::confidence),
            "taSource" => Some(Self::TextAnalysis(TextAnalysis {
                source: text(),
                ..Default::default()
            })),
            "taIdent" => Some(Self::TextAnalysis(TextAnalysis {
                ident: text(),
                ..Default::default()
            })),
            "term" => value.as_bool().map(|term| {
                Self::Terminology(Terminology {
                    term,
                    ..Default::default()
                })
            }),
            "termInfoRef" => Some(Self::Terminology(Terminology {
                info_ref: text(),
                ..Default::default()
            })),
            "termConfidence" => value.as_f64().map(|c| {
                Self::Terminology(Terminology {
                    confidence: Some(c),
                    ..Default::default()
                })
            }),
            "locQualityIssueType" => Some(Self::Quality(LocQuality {
                issue_type: text(),
                ..Default::default()
            })),
            "locQualityIssueComment" => Some(Self::Quality(LocQuality {
                comment: text(),
                ..Default::default()
            })),
            "locQualityIssueSeverity" => value.as_f64().map(|s| {
                Self::Quality(LocQuality {
                    severity: Some(s),
                    ..Default::default()
                })
            }),
            "locQualityRatingScore" => value.as_f64().map(|s| {
                Self::Quality(LocQuality {
                    rating_score: Some(s),
                    ..Default::default()
                })
            }),
            "locQualityProfileRef" => Some(Self::Quality(LocQuality {
                profile_ref: text(),
                ..Default::default()
            })),
            "mtConfidence" => value
                .as_f64()
                .map(|confidence| Self::MtConfidence { confidence }),
            "person" | "org" | "tool" | "revPerson" | "revOrg" | "revTool" | "provRef" => {
                let mut p = Provenance::default();
                let slot = match local {
                    "person" => &mut p.person,
                    "org" => &mut p.org,
                    "tool" => &mut p.tool,
                    "revPerson" => &mut p.rev_person,
                    "revOrg" => &mut p.rev_org,
                    "revTool" => &mut p.rev_tool,
                    _ => &mut p.prov_ref,
                };
                *slot = text();
                Some(Self::Provenance(p))
            }
            "annotatorsRef" => Some(Self::AnnotatorsRef {
                reference: value.render(),
            }),
            "storageSize" => value.as_u64().map(|size| Self::StorageSize {
                size,
                encoding: None,
            }),
            _ => None,
        };

        mapped.unwrap_or_else(|| Self::Generic {
            name: format!("its-{}", kebab_case(local)),
            value,
        })
    }

    /// Convert into generic attribute statements, in a stable order.
    pub fn statements(&self) -> Vec<Statement> {
        let mut out = Vec::new();
        let iri = |s: &String| AnnotationValue::Iri(s.clone());
        let string = |s: &String| AnnotationValue::String(s.clone());

        match self {
            Self::TextAnalysis(ta) => {
                push(&mut out, "its-ta-ident-ref", ta.ident_ref.as_ref().map(iri));
                push(&mut out, "its-ta-class-ref", ta.class_ref.as_ref().map(iri));
                push(
                    &mut out,
                    "its-ta-confidence",
                    ta.confidence.map(AnnotationValue::Double),
                );
                push(&mut out, "its-ta-source", ta.source.as_ref().map(string));
                push(&mut out, "its-ta-ident", ta.ident.as_ref().map(string));
            }
            Self::Terminology(t) => {
                out.push(Statement::new("its-term", AnnotationValue::Boolean(t.term)));
                push(&mut out, "its-term-info-ref", t.info_ref.as_ref().map(iri));
                push(
                    &mut out,
                    "its-term-confidence",
                    t.confidence.map(AnnotationValue::Double),
                );
            }
            Self::Quality(q) => {
                push(
                    &mut out,
                    "its-loc-quality-issue-type",
                    q.issue_type.as_ref().map(string),
                );
                push(
                    &mut out,
                    "its-loc-quality-issue-comment",
                    q.comment.as_ref().map(string),
                );
                push(
                    &mut out,
                    "its-loc-quality-issue-severity",
                    q.severity.map(AnnotationValue::Double),
                );
                push(
                    &mut out,
                    "its-loc-quality-rating-score",
                    q.rating_score.map(AnnotationValue::Double),
                );
                push(
                    &mut out,
                    "its-loc-quality-profile-ref",
                    q.profile_ref.as_ref().map(iri),
                );
            }
            Self::MtConfidence { confidence } => {
                out.push(Statement::new(
                    "its-mt-confidence",
                    AnnotationValue::Double(*confidence),
                ));
            }
            Self::Provenance(p) => {
                push(&mut out, "its-person", p.person.as_ref().map(string));
                push(&mut out, "its-org", p.org.as_ref().map(string));
                push(&mut out, "its-tool", p.tool.as_ref().map(string));
                push(&mut out, "its-rev-person", p.rev_person.as_ref().map(string));
                push(&mut out, "its-rev-org", p.rev_org.as_ref().map(string));
                push(&mut out, "its-rev-tool", p.rev_tool.as_ref().map(string));
                push(&mut out, "its-prov-ref", p.prov_ref.as_ref().map(iri));
            }
            Self::AnnotatorsRef { reference } => {
                out.push(Statement::new("its-annotators-ref", string(reference)));
            }
            Self::StorageSize { size, encoding } => {
                out.push(Statement::new(
                    "its-storage-size",
                    AnnotationValue::UnsignedInteger(*size),
                ));
                push(&mut out, "its-storage-encoding", encoding.as_ref().map(string));
            }
            Self::Generic { name, value } => {
                out.push(Statement::new(name.clone(), value.clone()));
            }
        }
        out
    }
}

fn push(out: &mut Vec<Statement>, name: &str, value: Option<AnnotationValue>) {
    if let Some(value) = value {
        out.push(Statement::new(name, value));
    }
}

/// Strip an IRI namespace or a CURIE prefix from a key.
fn local_name(key: &str) -> &str {
    key.rsplit(['#', '/', ':']).next().unwrap_or(key)
}

/// One annotation as received: the category-tagged form, or a map of logical
/// key/value statements such as `{"classReference": "...", "confidence": 0.9}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnnotationEntry {
    Tagged(InlineAnnotation),
    Statements(BTreeMap<String, Scalar>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Boolean(bool),
    Unsigned(u64),
    Integer(i64),
    Double(f64),
    Text(String),
}

impl From<Scalar> for AnnotationValue {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Boolean(b) => Self::Boolean(b),
            Scalar::Unsigned(u) => Self::UnsignedInteger(u),
            Scalar::Integer(i) => Self::Integer(i),
            Scalar::Double(d) => Self::Double(d),
            Scalar::Text(s) if s.starts_with("http://") || s.starts_with("https://") => {
                Self::Iri(s)
            }
            Scalar::Text(s) => Self::String(s),
        }
    }
}

/// Deserialize a list of annotations in either wire form.
///
/// Statement maps go through [`InlineAnnotation::from_key_value`], one
/// annotation per key, in key order.
pub fn deserialize_annotations<'de, D>(deserializer: D) -> Result<Vec<InlineAnnotation>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<AnnotationEntry>::deserialize(deserializer)?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            AnnotationEntry::Tagged(annotation) => out.push(annotation),
            AnnotationEntry::Statements(statements) => out.extend(
                statements
                    .into_iter()
                    .map(|(key, value)| InlineAnnotation::from_key_value(&key, value.into())),
            ),
        }
    }
    Ok(out)
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else if c == '_' {
            out.push('-');
        } else {
            out.push(c);
        }
    }
    out
}
