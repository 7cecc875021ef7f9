//! `GetSystemUpdateResponse` parsing
//!
//! The response is read with a namespace-aware pull parser. Only a handful of
//! elements matter:
//!
//! - `soapenv:Envelope` must be the root element
//! - `soapenv:Fault` aborts with its `faultstring`
//! - `ErrorCode` and `ContentPrefixURL` in the NUS namespace
//! - every NUS `TitleVersion` with its `TitleId`, `Version` and `FsSize` children
//!
//! A `TitleVersion` with a missing or malformed child is dropped with a
//! warning; the rest of the listing is still returned.

use crate::error::{Error, Result};
use crate::request::{NUS_NAMESPACE, SOAP_ENVELOPE_NAMESPACE};
use crate::types::{SystemUpdate, TitleEntry, TitleId};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ns {
    Soap,
    Nus,
    Other,
}

#[derive(Debug)]
struct Element {
    ns: Ns,
    name: String,
}

impl Element {
    fn new(ns: &ResolveResult<'_>, local_name: &[u8]) -> Self {
        let ns = match ns {
            ResolveResult::Bound(Namespace(n)) if *n == SOAP_ENVELOPE_NAMESPACE.as_bytes() => {
                Ns::Soap
            }
            ResolveResult::Bound(Namespace(n)) if *n == NUS_NAMESPACE.as_bytes() => Ns::Nus,
            _ => Ns::Other,
        };
        Self {
            ns,
            name: String::from_utf8_lossy(local_name).into_owned(),
        }
    }

    fn is(&self, ns: Ns, name: &str) -> bool {
        self.ns == ns && self.name == name
    }
}

/// Fields collected for one `TitleVersion` element
#[derive(Debug, Default)]
struct PendingEntry {
    title_id: Option<String>,
    version: Option<String>,
    fs_size: Option<String>,
}

impl PendingEntry {
    fn finish(self) -> std::result::Result<TitleEntry, String> {
        let title_id = self.title_id.ok_or("missing TitleId")?;
        let title_id: TitleId = title_id.parse()?;
        let version = self
            .version
            .ok_or_else(|| format!("missing Version for {}", title_id))?;
        let version: u16 = version
            .parse()
            .map_err(|_| format!("invalid Version '{}' for {}", version, title_id))?;
        let fs_size = self
            .fs_size
            .ok_or_else(|| format!("missing FsSize for {}", title_id))?;
        let fs_size: u64 = fs_size
            .parse()
            .map_err(|_| format!("invalid FsSize '{}' for {}", fs_size, title_id))?;
        Ok(TitleEntry {
            title_id,
            version,
            fs_size,
        })
    }
}

/// Parse the raw SOAP response into the list of titles
///
/// # Errors
///
/// - [`Error::Xml`] for malformed XML
/// - [`Error::InvalidResponse`] when the root is not a SOAP envelope or the
///   document ends inside an element
/// - [`Error::SoapFault`] when the body carries a fault
/// - [`Error::Service`] when `ErrorCode` is non-zero
pub fn parse_response(text: &str) -> Result<SystemUpdate> {
    let mut reader = NsReader::from_str(text);
    reader.trim_text(true);

    let mut path: Vec<Element> = Vec::new();
    let mut update = SystemUpdate::default();
    let mut pending: Option<PendingEntry> = None;
    let mut fault_string: Option<String> = None;
    let mut root_seen = false;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(e) => {
                let element = Element::new(&ns, e.local_name().as_ref());
                if path.is_empty() {
                    check_root(&element, root_seen)?;
                    root_seen = true;
                }
                if element.is(Ns::Nus, "TitleVersion") {
                    pending = Some(PendingEntry::default());
                }
                path.push(element);
            }
            Event::Empty(e) => {
                let element = Element::new(&ns, e.local_name().as_ref());
                if path.is_empty() {
                    check_root(&element, root_seen)?;
                    return Err(Error::InvalidResponse("empty SOAP envelope".into()));
                }
                if element.is(Ns::Nus, "TitleVersion") {
                    warn!("Dropping empty TitleVersion element");
                    update.skipped += 1;
                }
            }
            Event::Text(t) => {
                let value = t.unescape()?;
                let value = value.trim();
                let Some(leaf) = path.last() else {
                    continue;
                };
                let parent = path.len().checked_sub(2).and_then(|i| path.get(i));

                if let Some(entry) = pending.as_mut()
                    && parent.is_some_and(|p| p.is(Ns::Nus, "TitleVersion"))
                    && leaf.ns == Ns::Nus
                {
                    match leaf.name.as_str() {
                        "TitleId" => entry.title_id = Some(value.to_string()),
                        "Version" => entry.version = Some(value.to_string()),
                        "FsSize" => entry.fs_size = Some(value.to_string()),
                        _ => {}
                    }
                } else if leaf.is(Ns::Nus, "ErrorCode") {
                    update.error_code = value.parse().map_err(|_| {
                        Error::InvalidResponse(format!("invalid ErrorCode '{}'", value))
                    })?;
                } else if leaf.is(Ns::Nus, "ContentPrefixURL") {
                    update.content_prefix_url = Some(value.to_string());
                } else if leaf.name == "faultstring"
                    && parent.is_some_and(|p| p.is(Ns::Soap, "Fault"))
                {
                    fault_string = Some(value.to_string());
                }
            }
            Event::End(_) => {
                let Some(element) = path.pop() else {
                    continue;
                };
                if element.is(Ns::Nus, "TitleVersion") {
                    if let Some(entry) = pending.take() {
                        match entry.finish() {
                            Ok(entry) => update.entries.push(entry),
                            Err(reason) => {
                                warn!(reason = %reason, "Dropping malformed TitleVersion element");
                                update.skipped += 1;
                            }
                        }
                    }
                } else if element.is(Ns::Soap, "Fault") {
                    return Err(Error::SoapFault(
                        fault_string.unwrap_or_else(|| "no faultstring".to_string()),
                    ));
                }
            }
            Event::Eof => {
                if let Some(open) = path.last() {
                    return Err(Error::InvalidResponse(format!(
                        "document ended inside <{}>",
                        open.name
                    )));
                }
                if !root_seen {
                    return Err(Error::InvalidResponse("missing SOAP Envelope".into()));
                }
                break;
            }
            _ => {}
        }
    }

    if update.error_code != 0 {
        return Err(Error::Service {
            code: update.error_code,
        });
    }

    debug!(
        entries = update.entries.len(),
        skipped = update.skipped,
        content_prefix = ?update.content_prefix_url,
        "Parsed system update listing"
    );
    Ok(update)
}

fn check_root(element: &Element, root_seen: bool) -> Result<()> {
    if root_seen {
        return Err(Error::InvalidResponse(format!(
            "unexpected second root element <{}>",
            element.name
        )));
    }
    if !element.is(Ns::Soap, "Envelope") {
        return Err(Error::InvalidResponse(format!(
            "expected SOAP Envelope as root element, found <{}>",
            element.name
        )));
    }
    Ok(())
}
