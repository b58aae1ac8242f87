//! Scalar field reader for terminal response documents.
//!
//! Responses are flat `<Name>value</Name>` documents with at most one nested
//! group (`Amount`). Every leaf element is indexed by its lower-cased name, so
//! lookups are case-insensitive and nested fields are addressed by their own
//! name (`Purchase`, not `Amount/Purchase`). Bodies are trimmed, which makes
//! embedded newlines and indentation harmless. Unknown fields are kept but
//! never required.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Leaf element: opening tag (attributes tolerated), text body, closing tag.
static LEAF_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z_][\w.\-]*)(?:\s[^>]*)?>([^<]*)</([A-Za-z_][\w.\-]*)\s*>")
        .expect("leaf element regex is valid")
});

/// Parsed response document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDocument {
    fields: HashMap<String, String>,
}

impl ResponseDocument {
    /// Index every leaf element of `raw`. The first occurrence of a name wins.
    pub fn parse(raw: &str) -> Self {
        let mut fields = HashMap::new();

        for captures in LEAF_ELEMENT.captures_iter(raw) {
            let (Some(open), Some(body), Some(close)) =
                (captures.get(1), captures.get(2), captures.get(3))
            else {
                continue;
            };

            if !open.as_str().eq_ignore_ascii_case(close.as_str()) {
                continue;
            }

            fields
                .entry(open.as_str().to_ascii_lowercase())
                .or_insert_with(|| unescape(body.as_str().trim()));
        }

        Self { fields }
    }

    /// Value of `name`, or `None` when the element is absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Value of `name`, treating blank bodies as absent.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.field(name).filter(|value| !value.is_empty())
    }

    /// Value of `name`, or `default` when absent or blank.
    pub fn field_or(&self, name: &str, default: &str) -> String {
        self.non_empty(name).unwrap_or(default).to_string()
    }

    /// Number of indexed fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when nothing could be indexed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Read a single scalar field from a raw document.
pub fn read_field(raw: &str, name: &str) -> Option<String> {
    ResponseDocument::parse(raw).field(name).map(str::to_string)
}

/// Escape text for an element body.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<RStream>
  <CmdResponse>
    <ResponseOrigin>Processor</ResponseOrigin>
    <DSIXReturnCode>000000</DSIXReturnCode>
    <CmdStatus>Approved</CmdStatus>
    <TextResponse>
        AP*
    </TextResponse>
  </CmdResponse>
  <TranResponse>
    <Amount>
      <Purchase>12.34</Purchase>
      <Authorize>12.34</Authorize>
    </Amount>
    <CardholderName>DOE/JANE &amp; CO</CardholderName>
  </TranResponse>
</RStream>"#;

    #[test]
    fn test_reads_fields_case_insensitively() {
        let doc = ResponseDocument::parse(SAMPLE);

        assert_eq!(doc.field("CmdStatus"), Some("Approved"));
        assert_eq!(doc.field("cmdstatus"), Some("Approved"));
        assert_eq!(doc.field("CMDSTATUS"), Some("Approved"));
    }

    #[test]
    fn test_trims_multiline_bodies() {
        let doc = ResponseDocument::parse(SAMPLE);
        assert_eq!(doc.field("TextResponse"), Some("AP*"));
    }

    #[test]
    fn test_reads_nested_amount_fields() {
        assert_eq!(read_field(SAMPLE, "Purchase").as_deref(), Some("12.34"));
        assert_eq!(read_field(SAMPLE, "Authorize").as_deref(), Some("12.34"));
        // Group elements are not scalars
        assert_eq!(read_field(SAMPLE, "Amount"), None);
    }

    #[test]
    fn test_unescapes_entities() {
        assert_eq!(
            read_field(SAMPLE, "CardholderName").as_deref(),
            Some("DOE/JANE & CO")
        );
    }

    #[test]
    fn test_missing_and_blank_fields() {
        let doc = ResponseDocument::parse("<A><Empty></Empty><Blank>   </Blank></A>");

        assert_eq!(doc.field("Missing"), None);
        assert_eq!(doc.field("Empty"), Some(""));
        assert_eq!(doc.non_empty("Blank"), None);
        assert_eq!(doc.field_or("Blank", "0.00"), "0.00");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let doc = ResponseDocument::parse("<X><Code>1</Code><Code>2</Code></X>");
        assert_eq!(doc.field("Code"), Some("1"));
    }

    #[test]
    fn test_mismatched_tags_are_ignored() {
        let doc = ResponseDocument::parse("<Open>value</Close>");
        assert!(doc.is_empty());
    }

    #[test]
    fn test_escape_round_trips_through_reader() {
        let raw = format!("<Line1>{}</Line1>", escape("TOTAL <USD> & \"tip\""));
        assert_eq!(read_field(&raw, "Line1").as_deref(), Some("TOTAL <USD> & \"tip\""));
    }
}
