//! Attribute grouping and markup decoration.
//!
//! Attributes go into the parent's trailing open tag only when that element
//! encloses exactly the unit, i.e. its end tag follows the unit directly. A
//! unit at the start of a `<p>` holding several units therefore gets a fresh
//! wrapper rather than decorating the whole paragraph.

use crate::annotation::Statement;
use crate::config::ConverterConfig;

/// One attribute name with every distinct value it received, in order of
/// first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeGroup {
    pub name: String,
    /// Escaped attribute values.
    pub values: Vec<String>,
}

/// Group statements by attribute name.
///
/// Values already present on `parent` as `name="value"` are excluded before
/// grouping, so decorating already-decorated markup adds nothing.
pub fn group_statements(statements: &[Statement], parent: &str) -> Vec<AttributeGroup> {
    let mut groups: Vec<AttributeGroup> = Vec::new();
    for statement in statements {
        let value = escape_attribute(&statement.value.render());
        if parent.contains(&format!("{}=\"{}\"", statement.name, value)) {
            continue;
        }
        match groups.iter_mut().find(|g| g.name == statement.name) {
            Some(group) => {
                if !group.values.contains(&value) {
                    group.values.push(value);
                }
            }
            None => groups.push(AttributeGroup {
                name: statement.name.clone(),
                values: vec![value],
            }),
        }
    }
    groups
}

/// Render groups as an attribute list with a leading space.
///
/// A group with several values carries the first one under its own name and
/// all of them, space-separated, under `<prefix><name>s`.
pub fn render_groups(groups: &[AttributeGroup], prefix: &str) -> String {
    let mut out = String::new();
    for group in groups {
        let Some(first) = group.values.first() else {
            continue;
        };
        out.push_str(&format!(" {}=\"{}\"", group.name, first));
        if group.values.len() > 1 {
            out.push_str(&format!(
                " {prefix}{}s=\"{}\"",
                group.name,
                group.values.join(" ")
            ));
        }
    }
    out
}

pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Wrap `text` in a fresh `element` carrying `attributes`.
pub fn wrap(text: &str, attributes: &str, element: &str) -> String {
    format!("<{element}{attributes}>{text}</{element}>")
}

/// Byte index of the `>` closing `parent`'s trailing open tag, if that tag is
/// closed right after the unit (`following` starts with its end tag).
pub fn enclosing_open_tag(parent: &str, following: &str) -> Option<usize> {
    let body = parent.strip_suffix('>')?;
    let open = body.rfind('<')?;
    let tag = &body[open + 1..];
    if tag.starts_with(['/', '!', '?']) || tag.ends_with('/') {
        return None;
    }
    let name_len = tag
        .find(|c: char| c.is_whitespace())
        .unwrap_or(tag.len());
    let name = &tag[..name_len];
    if name.is_empty() {
        return None;
    }
    let rest = following.strip_prefix("</")?.strip_prefix(name)?;
    if rest.starts_with('>') || rest.starts_with(char::is_whitespace) {
        Some(body.len())
    } else {
        None
    }
}

/// Emit `parent` followed by `text`, decorated with `statements`.
///
/// The attributes go onto the element enclosing the unit when there is one,
/// otherwise the text is wrapped in the configured element.
pub fn decorate(
    parent: &str,
    text: &str,
    following: &str,
    statements: &[Statement],
    config: &ConverterConfig,
) -> String {
    let groups = group_statements(statements, parent);
    if groups.is_empty() {
        return format!("{parent}{text}");
    }
    let attributes = render_groups(&groups, &config.group_prefix);
    match enclosing_open_tag(parent, following) {
        Some(at) => format!("{}{attributes}{}{text}", &parent[..at], &parent[at..]),
        None => format!("{parent}{}", wrap(text, &attributes, &config.wrapper_element)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationValue;

    fn class_ref(value: &str) -> Statement {
        Statement::new("its-ta-class-ref", AnnotationValue::Iri(value.into()))
    }

    #[test]
    fn groups_repeated_names() {
        let statements = vec![class_ref("A"), class_ref("B"), class_ref("A"), class_ref("C")];
        let groups = group_statements(&statements, "");
        assert_eq!(groups.len(), 1);
        assert_eq!(
            render_groups(&groups, "data-"),
            " its-ta-class-ref=\"A\" data-its-ta-class-refs=\"A B C\""
        );
    }

    #[test]
    fn excludes_values_present_on_parent() {
        let statements = vec![class_ref("A"), class_ref("B")];
        let groups = group_statements(&statements, "<b its-ta-class-ref=\"A\">");
        assert_eq!(render_groups(&groups, "data-"), " its-ta-class-ref=\"B\"");
    }

    #[test]
    fn values_are_escaped_and_booleans_spelled_out() {
        let statements = vec![
            Statement::new("its-ta-ident", AnnotationValue::String("a \"b\" & <c>".into())),
            Statement::new("its-term", AnnotationValue::Boolean(true)),
        ];
        let rendered = render_groups(&group_statements(&statements, ""), "data-");
        assert_eq!(
            rendered,
            " its-ta-ident=\"a &quot;b&quot; &amp; &lt;c>\" its-term=\"yes\""
        );
    }

    #[test]
    fn finds_enclosing_tag_only_when_closed_after_unit() {
        assert_eq!(enclosing_open_tag("<p>Hi <b>", "</b> there"), Some(8));
        assert_eq!(enclosing_open_tag("<a href=\"x\">", "</a>"), Some(11));
        assert_eq!(enclosing_open_tag("<b>", "</bdi>"), None);
        assert_eq!(enclosing_open_tag("<b>", " more</b>"), None);
        assert_eq!(enclosing_open_tag("<br/>", "</br>"), None);
        assert_eq!(enclosing_open_tag("</i>", "</p>"), None);
        assert_eq!(enclosing_open_tag("text ", "</p>"), None);
    }

    #[test]
    fn decorate_injects_or_wraps() {
        let config = ConverterConfig::default();
        let statements = vec![Statement::new(
            "its-ta-ident-ref",
            AnnotationValue::Iri("Berlin".into()),
        )];
        assert_eq!(
            decorate("<b>", "World", "</b>!", &statements, &config),
            "<b its-ta-ident-ref=\"Berlin\">World"
        );
        assert_eq!(
            decorate("", "World", "!", &statements, &config),
            "<span its-ta-ident-ref=\"Berlin\">World</span>"
        );
        // Already decorated: nothing to add.
        assert_eq!(
            decorate("<b its-ta-ident-ref=\"Berlin\">", "World", "</b>", &statements, &config),
            "<b its-ta-ident-ref=\"Berlin\">World"
        );
    }
}
