//! Flat-file text format for [`ConfigDocument`].
//!
//! ```text
//! #BioModule biolockj.module.seq.Rarefier
//! #BioModule biolockj.module.classifier.r16s.RdpClassifier
//! input.dirPaths=/data/seqs
//! rarefier.max=500
//! ```
//!
//! Modules always come first. Only the first `=` separates key from value,
//! nothing is escaped.

use super::ConfigDocument;
use crate::errors::ConfigError;

pub const MODULE_MARKER: &str = "#BioModule ";
pub const COMMENT_MARKER: char = '#';

pub fn encode(doc: &ConfigDocument) -> String {
    let mut out = String::new();
    for module in doc.modules() {
        out.push_str(MODULE_MARKER);
        out.push_str(module);
        out.push('\n');
    }
    for (key, value) in doc.params() {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

pub fn decode(source_name: &str, text: &str) -> Result<ConfigDocument, ConfigError> {
    let mut doc = ConfigDocument::new(source_name);

    for (idx, line) in text.lines().enumerate() {
        let malformed = || ConfigError::MalformedFlatFile {
            line_number: idx + 1,
            line: line.to_string(),
        };

        if line.trim().is_empty() {
            continue;
        }
        if let Some(id) = line.strip_prefix(MODULE_MARKER) {
            let id = id.trim();
            if id.is_empty() {
                return Err(malformed());
            }
            doc.push_module(id)?;
            continue;
        }
        if line.starts_with(COMMENT_MARKER) {
            continue;
        }
        match line.split_once('=') {
            Some((key, _)) if key.is_empty() => return Err(malformed()),
            Some((key, value)) => doc.set_param(key, value).map_err(|_| malformed())?,
            None => return Err(malformed()),
        }
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigDocument {
        let mut doc = ConfigDocument::new("demo.properties");
        doc.push_module("pkg.seq.X").unwrap();
        doc.push_module("pkg.classifier.Y").unwrap();
        doc.set_param("input.dirPaths", "/data/in").unwrap();
        doc.set_param("script.defaultHeader", "#!/bin/bash").unwrap();
        doc.set_param("url", "http://host/?a=b").unwrap();
        doc
    }

    #[test]
    fn test_encode_modules_before_params() {
        let text = encode(&sample());
        assert_eq!(
            text,
            "#BioModule pkg.seq.X\n\
             #BioModule pkg.classifier.Y\n\
             input.dirPaths=/data/in\n\
             script.defaultHeader=#!/bin/bash\n\
             url=http://host/?a=b\n"
        );
    }

    #[test]
    fn test_round_trip() {
        let doc = sample();
        assert_eq!(decode("demo.properties", &encode(&doc)).unwrap(), doc);
    }

    #[test]
    fn test_round_trip_empty_document() {
        let doc = ConfigDocument::new("empty.properties");
        assert_eq!(encode(&doc), "");
        assert_eq!(decode("empty.properties", "").unwrap(), doc);
    }

    #[test]
    fn test_decode_skips_comments_and_blanks() {
        let text = "# generated\n\n#BioModule a.b\n  \nk=v\n#k2=v2\n";
        let doc = decode("x", text).unwrap();
        assert_eq!(doc.modules(), &["a.b".to_string()][..]);
        assert_eq!(doc.params().collect::<Vec<_>>(), vec![("k", "v")]);
    }

    #[test]
    fn test_decode_splits_on_first_equals_only() {
        let doc = decode("x", "a=b=c\n").unwrap();
        assert_eq!(doc.get("a"), Some("b=c"));
    }

    #[test]
    fn test_decode_handles_crlf() {
        let doc = decode("x", "#BioModule a.b\r\nk=v\r\n").unwrap();
        assert_eq!(doc.modules(), &["a.b".to_string()][..]);
        assert_eq!(doc.get("k"), Some("v"));
    }

    #[test]
    fn test_decode_malformed_line_reports_position() {
        let err = decode("x", "#BioModule a.b\nk=v\nthis is not valid\n").unwrap_err();
        match err {
            ConfigError::MalformedFlatFile { line_number, line } => {
                assert_eq!(line_number, 3);
                assert_eq!(line, "this is not valid");
            }
            other => panic!("Expected MalformedFlatFile, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_empty_key_and_empty_module() {
        assert!(matches!(
            decode("x", "=value\n"),
            Err(ConfigError::MalformedFlatFile { line_number: 1, .. })
        ));
        assert!(matches!(
            decode("x", "k=v\n#BioModule   \n"),
            Err(ConfigError::MalformedFlatFile { line_number: 2, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_duplicate_module() {
        let err = decode("x", "#BioModule a.b\n#BioModule a.b\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateModule { id } if id == "a.b"));
    }

    #[test]
    fn test_decode_repeated_key_replaces() {
        let doc = decode("x", "a=1\nb=2\na=3\n").unwrap();
        assert_eq!(doc.params().collect::<Vec<_>>(), vec![("a", "3"), ("b", "2")]);
    }
}
