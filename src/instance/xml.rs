//! Small `quick_xml` helpers shared by the instance reader, in the same
//! style as the teacher's `readers/plazi/parsing.rs`: name comparisons and
//! attribute lookups that don't require building a full DOM.

use quick_xml::events::{BytesEnd, BytesStart};
use quick_xml::Reader;

use crate::errors::InstanceError;

/// The element's raw qualified name (e.g. `"us-gaap:Assets"`), taken
/// verbatim without namespace resolution -- XBRL instances declare prefixes
/// consistently enough within one document that comparing raw qnames
/// against the taxonomy's concept names is sufficient.
pub fn qname_string(event: &BytesStart) -> String {
    String::from_utf8_lossy(event.name().as_ref()).into_owned()
}

pub fn start_eq(event: &BytesStart, name: &str) -> bool {
    event.name().as_ref() == name.as_bytes()
}

pub fn end_eq(event: &BytesEnd, name: &str) -> bool {
    event.name().as_ref() == name.as_bytes()
}

/// Reads a required attribute's value, decoding entities.
pub fn parse_attribute<R>(reader: &Reader<R>, event: &BytesStart, name: &str) -> Result<String, InstanceError> {
    parse_attribute_opt(reader, event, name)?
        .ok_or_else(|| InstanceError::FactParse(qname_string(event), format!("missing required attribute '{name}'")))
}

/// Reads an optional attribute's value, decoding entities.
pub fn parse_attribute_opt<R>(_reader: &Reader<R>, event: &BytesStart, name: &str) -> Result<Option<String>, InstanceError> {
    for attr in event.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr.unescape_value()?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
