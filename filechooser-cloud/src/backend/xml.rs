//! Minimal extraction of values from listing responses.
//!
//! Both stores answer listings with small, flat XML documents; only a
//! handful of element values are needed, so no XML parser is pulled in.

/// Text of every `<tag>…</tag>` element, entity-unescaped.
pub fn tag_values(xml: &str, tag: &str) -> Vec<String> {
    blocks(xml, tag).into_iter().map(unescape).collect()
}

/// `<inner>` values found inside each `<outer>` element.
pub fn nested_values(xml: &str, outer: &str, inner: &str) -> Vec<String> {
    blocks(xml, outer)
        .into_iter()
        .flat_map(|block| tag_values(block, inner))
        .collect()
}

fn blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find(&open) {
        remaining = &remaining[start + open.len()..];
        match remaining.find(&close) {
            Some(end) => {
                found.push(&remaining[..end]);
                remaining = &remaining[end + close.len()..];
            }
            None => break,
        }
    }
    found
}

/// Decode the predefined entities and numeric character references
/// (`&#13;`, `&#x1F;`) in one pass. Anything unrecognised is kept verbatim.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .and_then(|semi| entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = match name.strip_prefix('#')? {
                hex if hex.starts_with(['x', 'X']) => u32::from_str_radix(&hex[1..], 16).ok()?,
                dec => dec.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Contents><Key>prefix/abc12345/file.txt</Key></Contents>
  <Contents><Key>prefix/R&amp;D/photo.jpg</Key></Contents>
</ListBucketResult>"#;
        let keys = tag_values(xml, "Key");
        assert_eq!(keys, vec!["prefix/abc12345/file.txt", "prefix/R&D/photo.jpg"]);
    }

    #[test]
    fn test_similar_tags_do_not_match() {
        let xml = "<Owner><DisplayName>me</DisplayName></Owner><Buckets><Bucket><Name>b1</Name></Bucket></Buckets>";
        assert_eq!(tag_values(xml, "Name"), vec!["b1"]);
    }

    #[test]
    fn test_nested_values() {
        let xml = "<Blobs><BlobPrefix><Name>logs/</Name></BlobPrefix><Blob><Name>a.txt</Name><Properties/></Blob></Blobs>";
        assert_eq!(nested_values(xml, "BlobPrefix", "Name"), vec!["logs/"]);
        assert_eq!(nested_values(xml, "Blob", "Name"), vec!["a.txt"]);
    }

    #[test]
    fn test_numeric_character_references() {
        let xml = "<Key>line&#13;break</Key><Key>unit&#x1F;sep</Key><Key>&#X41;&#66;</Key>";
        assert_eq!(tag_values(xml, "Key"), vec!["line\rbreak", "unit\u{1f}sep", "AB"]);
    }

    #[test]
    fn test_unescape_is_single_pass() {
        assert_eq!(unescape("&amp;lt;"), "&lt;");
        assert_eq!(unescape("a & b &bogus; &#xZZ;"), "a & b &bogus; &#xZZ;");
    }

    #[test]
    fn test_unterminated_element_is_ignored() {
        assert!(tag_values("<Key>dangling", "Key").is_empty());
    }
}
