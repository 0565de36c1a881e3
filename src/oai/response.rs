//! Parsing of OAI-PMH response envelopes.
//!
//! Every response is an `<OAI-PMH>` root holding either an `<error code="...">`
//! or an element named after the verb. Elements are matched by local name, so
//! repositories that prefix the OAI namespace are read the same way.

use serde::Serialize;

use crate::error::{HarvestError, Result};
use crate::model::RecordHeader;
use crate::oai::request::Verb;
use crate::oai::{RawRecord, RecordPage};
use crate::xml::{parse_document, XmlElement};

/// OAI error code answered when a listing matches nothing.
pub const NO_RECORDS_MATCH: &str = "noRecordsMatch";

/// Repository description returned by `Identify`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryIdentity {
    /// Human readable repository name.
    pub repository_name: String,
    /// Base URL the repository reports for itself.
    pub base_url: String,
    /// Protocol version, normally `2.0`.
    pub protocol_version: String,
    /// Earliest datestamp.
    pub earliest_datestamp: Option<String>,
    /// Deleted-record support (`no`, `transient`, `persistent`).
    pub deleted_record: Option<String>,
    /// Datestamp granularity.
    pub granularity: Option<String>,
    /// Administrator e-mail addresses.
    pub admin_emails: Vec<String>,
}

/// One entry of `ListSets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetInfo {
    /// Set spec used in requests.
    pub spec: String,
    /// Display name.
    pub name: Option<String>,
}

/// One entry of `ListMetadataFormats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataFormat {
    /// Prefix used in requests.
    pub prefix: String,
    /// XML schema location.
    pub schema: Option<String>,
    /// Metadata namespace.
    pub namespace: Option<String>,
}

/// Outcome of reading an envelope.
#[derive(Debug)]
pub(crate) enum Envelope {
    /// The verb element.
    Payload(XmlElement),
    /// `noRecordsMatch`: an empty listing.
    NoRecords,
}

/// Parses an envelope and returns the element named after `verb`.
///
/// `noRecordsMatch` is reported as [`Envelope::NoRecords`]; every other OAI
/// error code becomes a [`HarvestError::Protocol`] carrying the code.
pub(crate) fn parse_envelope(handler: &str, verb: Verb, body: &str) -> Result<Envelope> {
    let root = parse_document(body)
        .map_err(|e| HarvestError::protocol(handler, format!("malformed response: {e}")))?;
    if root.local_name != "OAI-PMH" {
        return Err(HarvestError::protocol(
            handler,
            format!("unexpected root element <{}>", root.name),
        ));
    }
    if let Some(error) = root.child("error") {
        let code = error.attr("code").unwrap_or_default().to_string();
        if code == NO_RECORDS_MATCH {
            return Ok(Envelope::NoRecords);
        }
        return Err(HarvestError::Protocol {
            handler: handler.to_string(),
            message: error
                .trimmed_text()
                .unwrap_or_else(|| format!("repository answered with {code}")),
            code: Some(code),
        });
    }
    let mut root = root;
    let index = root
        .children
        .iter()
        .position(|c| c.local_name == verb.as_str())
        .ok_or_else(|| HarvestError::protocol(handler, format!("response has no <{verb}> element")))?;
    Ok(Envelope::Payload(root.children.swap_remove(index)))
}

pub(crate) fn parse_identity(element: &XmlElement) -> RepositoryIdentity {
    RepositoryIdentity {
        repository_name: element.text_at(&["repositoryName"]).unwrap_or_default(),
        base_url: element.text_at(&["baseURL"]).unwrap_or_default(),
        protocol_version: element.text_at(&["protocolVersion"]).unwrap_or_default(),
        earliest_datestamp: element.text_at(&["earliestDatestamp"]),
        deleted_record: element.text_at(&["deletedRecord"]),
        granularity: element.text_at(&["granularity"]),
        admin_emails: element
            .children_named("adminEmail")
            .filter_map(XmlElement::trimmed_text)
            .collect(),
    }
}

pub(crate) fn parse_sets(element: &XmlElement) -> Vec<SetInfo> {
    element
        .children_named("set")
        .filter_map(|set| {
            Some(SetInfo {
                spec: set.text_at(&["setSpec"])?,
                name: set.text_at(&["setName"]),
            })
        })
        .collect()
}

pub(crate) fn parse_metadata_formats(element: &XmlElement) -> Vec<MetadataFormat> {
    element
        .children_named("metadataFormat")
        .filter_map(|format| {
            Some(MetadataFormat {
                prefix: format.text_at(&["metadataPrefix"])?,
                schema: format.text_at(&["schema"]),
                namespace: format.text_at(&["metadataNamespace"]),
            })
        })
        .collect()
}

/// Reads the records (or bare headers) and resumption state of a listing.
pub(crate) fn parse_record_page(handler: &str, element: XmlElement) -> Result<RecordPage> {
    let resumption = element.child("resumptionToken");
    let resumption_token = resumption.and_then(XmlElement::trimmed_text);
    let complete_list_size = resumption
        .and_then(|r| r.attr("completeListSize"))
        .and_then(|size| size.trim().parse().ok());

    let mut records = Vec::new();
    for child in element.children {
        match child.local_name.as_str() {
            "record" => records.push(parse_record(handler, child)?),
            "header" => records.push(RawRecord {
                header: parse_header(handler, &child)?,
                metadata: None,
            }),
            _ => {},
        }
    }
    Ok(RecordPage {
        records,
        resumption_token,
        complete_list_size,
    })
}

/// Reads a `<record>` element.
pub(crate) fn parse_record(handler: &str, record: XmlElement) -> Result<RawRecord> {
    let header = record
        .child("header")
        .ok_or_else(|| HarvestError::protocol(handler, "record without header"))
        .and_then(|h| parse_header(handler, h))?;
    let metadata = record
        .children
        .into_iter()
        .find(|c| c.local_name == "metadata")
        .and_then(|m| m.children.into_iter().next());
    Ok(RawRecord { header, metadata })
}

fn parse_header(handler: &str, header: &XmlElement) -> Result<RecordHeader> {
    let identifier = header
        .text_at(&["identifier"])
        .ok_or_else(|| HarvestError::protocol(handler, "record header without identifier"))?;
    Ok(RecordHeader {
        identifier,
        datestamp: header.text_at(&["datestamp"]),
        set_specs: header
            .children_named("setSpec")
            .filter_map(XmlElement::trimmed_text)
            .collect(),
        deleted: header.attr("status") == Some("deleted"),
    })
}
