//! Schema classification of metadata documents.
//!
//! [`classify`] parses raw bytes as XML in a single streaming pass with a
//! namespace-aware `quick_xml` reader, matches the root element against the
//! supported schemas, and pulls out the document's own identifier plus an
//! optional change date.
//!
//! | Schema | Root element | Identifier | Change date |
//! |--------|--------------|------------|-------------|
//! | `iso19139` | `gmd:MD_Metadata` | `gmd:fileIdentifier` | `gmd:dateStamp` |
//! | `iso19115-3.2018` | `mdb:MD_Metadata` | `mdb:metadataIdentifier/*/mcc:code` | `mdb:dateInfo/*/cit:date` |
//! | `dublin-core` | `simpledc`, `csw:Record` | `dc:identifier` | `dct:modified` |
//! | `fgdc-std` | `metadata` | `idinfo/datsetid`, `idinfo/citation/citeinfo/onlink` | `metainfo/metd` |

use std::borrow::Cow;
use std::path::Path;

use catalog_harvest_core::result::FileError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Reader};
use thiserror::Error;

const NS_GMD: &str = "http://www.isotc211.org/2005/gmd";
const NS_MDB: &str = "http://standards.iso.org/iso/19115/-3/mdb/2.0";
const NS_MDB_1: &str = "http://standards.iso.org/iso/19115/-3/mdb/1.0";
const NS_CSW: &str = "http://www.opengis.net/cat/csw/2.0.2";

/// A supported record schema and where its fields live.
///
/// Paths are sequences of element local names below the root element. The
/// first path yielding non-empty text wins.
#[derive(Debug)]
pub struct SchemaDef {
    pub id: &'static str,
    pub root: &'static str,
    /// Accepted root namespaces. Empty means the root must be unqualified.
    pub namespaces: &'static [&'static str],
    pub identity_paths: &'static [&'static [&'static str]],
    pub changed_paths: &'static [&'static [&'static str]],
}

impl SchemaDef {
    fn matches(&self, root: &str, namespace: Option<&str>) -> bool {
        if self.root != root {
            return false;
        }
        match namespace {
            Some(ns) => self.namespaces.contains(&ns),
            None => self.namespaces.is_empty(),
        }
    }
}

pub static SCHEMAS: &[SchemaDef] = &[
    SchemaDef {
        id: "iso19139",
        root: "MD_Metadata",
        namespaces: &[NS_GMD],
        identity_paths: &[&["fileIdentifier", "CharacterString"]],
        changed_paths: &[&["dateStamp", "DateTime"], &["dateStamp", "Date"]],
    },
    SchemaDef {
        id: "iso19115-3.2018",
        root: "MD_Metadata",
        namespaces: &[NS_MDB, NS_MDB_1],
        identity_paths: &[&[
            "metadataIdentifier",
            "MD_Identifier",
            "code",
            "CharacterString",
        ]],
        changed_paths: &[
            &["dateInfo", "CI_Date", "date", "DateTime"],
            &["dateInfo", "CI_Date", "date", "Date"],
        ],
    },
    SchemaDef {
        id: "dublin-core",
        root: "simpledc",
        namespaces: &[],
        identity_paths: &[&["identifier"]],
        changed_paths: &[&["modified"], &["date"]],
    },
    SchemaDef {
        id: "dublin-core",
        root: "Record",
        namespaces: &[NS_CSW],
        identity_paths: &[&["identifier"]],
        changed_paths: &[&["modified"], &["date"]],
    },
    SchemaDef {
        id: "fgdc-std",
        root: "metadata",
        namespaces: &[],
        identity_paths: &[
            &["idinfo", "datsetid"],
            &["idinfo", "citation", "citeinfo", "onlink"],
        ],
        changed_paths: &[&["metainfo", "metd"]],
    },
];

/// A recognized record, ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedDocument {
    pub schema: &'static str,
    /// Identifier declared by the document itself.
    pub identity: String,
    /// Change date embedded in the document, if present and parseable.
    pub changed: Option<DateTime<Utc>>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("invalid content: {0}")]
    InvalidContent(String),
    #[error("unsupported schema (root element <{0}>)")]
    UnsupportedSchema(String),
    #[error("no identifier found for schema {0}")]
    MissingIdentity(&'static str),
}

impl ClassifyError {
    pub fn into_file_error(self, path: &Path) -> FileError {
        let path = path.to_path_buf();
        match self {
            ClassifyError::InvalidContent(message) => FileError::InvalidContent { path, message },
            ClassifyError::UnsupportedSchema(root) => FileError::UnsupportedSchema { path, root },
            ClassifyError::MissingIdentity(schema) => FileError::MissingIdentity {
                path,
                schema: schema.to_string(),
            },
        }
    }
}

fn path_is(stack: &[String], path: &[&str]) -> bool {
    stack.len() == path.len() && stack.iter().zip(path).all(|(a, b)| a == b)
}

/// First non-empty capture in path priority order.
fn first_capture(captures: &mut [Option<String>]) -> Option<String> {
    captures.iter_mut().find_map(Option::take)
}

/// Classify raw file content.
///
/// Bytes are decoded with the encoding named in the XML declaration, or as
/// UTF-8 when the declaration names none. The returned content is always
/// UTF-8.
pub fn classify(bytes: &[u8]) -> Result<ClassifiedDocument, ClassifyError> {
    let declared = match Reader::from_reader(bytes).read_event() {
        Ok(Event::Decl(decl)) => decl.encoder(),
        _ => None,
    };
    let content: Cow<'_, str> = match declared {
        Some(encoding) => {
            let (text, _, malformed) = encoding.decode(bytes);
            if malformed {
                return Err(ClassifyError::InvalidContent(format!(
                    "not valid {}",
                    encoding.name()
                )));
            }
            text
        }
        None => Cow::Borrowed(
            std::str::from_utf8(bytes)
                .map_err(|e| ClassifyError::InvalidContent(format!("not UTF-8: {}", e)))?,
        ),
    };

    let mut reader = NsReader::from_str(&content);
    let mut root: Option<String> = None;
    let mut schema: Option<&'static SchemaDef> = None;
    // Local names of open elements below the root.
    let mut stack: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut text = String::new();
    let mut identities: Vec<Option<String>> = Vec::new();
    let mut changes: Vec<Option<String>> = Vec::new();

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| ClassifyError::InvalidContent(e.to_string()))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

                if depth == 0 {
                    if root.is_some() {
                        return Err(ClassifyError::InvalidContent(
                            "more than one root element".to_string(),
                        ));
                    }
                    let namespace = match ns {
                        ResolveResult::Bound(Namespace(uri)) => {
                            Some(String::from_utf8_lossy(uri).into_owned())
                        }
                        _ => None,
                    };
                    schema = SCHEMAS
                        .iter()
                        .find(|s| s.matches(&local, namespace.as_deref()));
                    if let Some(def) = schema {
                        identities = vec![None; def.identity_paths.len()];
                        changes = vec![None; def.changed_paths.len()];
                    }
                    root = Some(local);
                } else {
                    stack.push(local);
                }

                if is_empty {
                    if depth > 0 {
                        stack.pop();
                    }
                } else {
                    depth += 1;
                }
                text.clear();
            }
            Event::Text(t) => {
                if schema.is_some() && depth > 1 {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| ClassifyError::InvalidContent(e.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(c) => {
                if schema.is_some() && depth > 1 {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(def) = schema {
                    let value = text.trim();
                    if !value.is_empty() {
                        capture(&stack, def.identity_paths, &mut identities, value);
                        capture(&stack, def.changed_paths, &mut changes, value);
                    }
                }
                depth = depth.saturating_sub(1);
                stack.pop();
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let root = root.ok_or_else(|| ClassifyError::InvalidContent("no root element".to_string()))?;
    if depth != 0 {
        return Err(ClassifyError::InvalidContent(format!(
            "unexpected end of document inside <{}>",
            root
        )));
    }
    let schema = schema.ok_or(ClassifyError::UnsupportedSchema(root))?;
    let identity = first_capture(&mut identities).ok_or(ClassifyError::MissingIdentity(schema.id))?;
    let changed = first_capture(&mut changes).and_then(|raw| parse_timestamp(&raw));

    Ok(ClassifiedDocument {
        schema: schema.id,
        identity,
        changed,
        content: content.into_owned(),
    })
}

fn capture(
    stack: &[String],
    paths: &[&[&str]],
    slots: &mut [Option<String>],
    value: &str,
) {
    for (path, slot) in paths.iter().zip(slots.iter_mut()) {
        if slot.is_none() && path_is(stack, path) {
            *slot = Some(value.to_string());
        }
    }
}

/// Parse the date formats found in metadata records: RFC 3339, ISO local
/// date-times, ISO dates and FGDC `YYYYMMDD`. Local times are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}
