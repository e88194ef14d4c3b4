//! Minimal parsing of `_bulk_get` multipart bodies.
//!
//! Each section looks like:
//!
//! ```text
//! --5570ab847be212079e2b05bbbfa023da25b07712bda36aec6481bca024f3
//! Content-Type: application/json
//!
//! {"_id":"db_0","_rev":"1-9a525c69cafb3d1cdf69545fa5ccfecc","updates":0}
//! ```
//!
//! The document JSON is always the last non-empty line of a section; boundary
//! and header lines never parse as JSON objects.

use serde_json::Value;
use tracing::debug;

/// Extract the per-document JSON bodies from a multipart response. Sections
/// without a parseable document (preamble, epilogue) are skipped.
pub fn parse_bulk_get_body(body: &str) -> Vec<Value> {
    let mut docs = Vec::new();

    for part in body.split("--") {
        let lines: Vec<&str> = part.lines().filter(|l| !l.trim().is_empty()).collect();
        // A document section has at least a boundary remnant, a header and a
        // body line.
        if lines.len() < 2 {
            continue;
        }
        let candidate = lines[lines.len() - 1].trim();
        match serde_json::from_str::<Value>(candidate) {
            Ok(doc) if doc.is_object() => docs.push(doc),
            Ok(_) => {}
            Err(err) => {
                debug!(line = candidate, error = %err, "skipping unparseable multipart line");
            }
        }
    }

    docs
}
