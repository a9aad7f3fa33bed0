//! EPUB parsing utilities (OPF, NCX, container.xml)

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::book::{ManifestItem, Metadata, Package};
use crate::error::{Error, Result};
use crate::paginate::NavPoint;
use crate::util::resolve_path;

/// Parse META-INF/container.xml to find the OPF path.
pub fn parse_container_xml(bytes: &[u8]) -> Result<String> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(Error::InvalidEpub(
        "No rootfile found in container.xml".into(),
    ))
}

/// Parse the OPF package document located in `base_dir`.
pub fn parse_opf(content: &str, base_dir: &str) -> Result<Package> {
    // Text is trimmed once collected; trimming events would eat the spaces
    // around entity references.
    let mut reader = Reader::from_str(content);

    let mut metadata = Metadata::default();
    let mut manifest: Vec<ManifestItem> = Vec::new();
    let mut spine: Vec<String> = Vec::new();
    let mut toc_id: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"metadata" => in_metadata = true,
                    b"title" | b"creator" | b"language" | b"identifier" | b"publisher"
                    | b"description" | b"subject" | b"date" | b"rights" => {
                        if in_metadata {
                            current_element = Some(String::from_utf8_lossy(local).to_string());
                            buf_text.clear();
                        }
                    }
                    b"spine" => toc_id = attribute(&e, b"toc")?,
                    b"item" => manifest.extend(manifest_item(&e)?),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"item" => manifest.extend(manifest_item(&e)?),
                    b"itemref" => spine.extend(attribute(&e, b"idref")?),
                    b"meta" => {
                        let is_cover = attribute(&e, b"name")?.is_some_and(|n| n == "cover");
                        if is_cover
                            && let Some(id) = attribute(&e, b"content")?.filter(|c| !c.is_empty())
                        {
                            metadata.cover_id = Some(id);
                        }
                    }
                    b"spine" => toc_id = attribute(&e, b"toc")?,
                    _ => {}
                }
            }
            Event::Text(e) => {
                if current_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current_element.is_some() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        buf_text.push_str(&resolved);
                    }
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"metadata" {
                    in_metadata = false;
                }

                if let Some(ref elem) = current_element {
                    let text = std::mem::take(&mut buf_text).trim().to_string();
                    match elem.as_str() {
                        "title" => metadata.title = text,
                        "creator" => metadata.authors.push(text),
                        "language" => metadata.language = text,
                        "identifier" if metadata.identifier.is_empty() => {
                            metadata.identifier = text
                        }
                        "publisher" => metadata.publisher = Some(text),
                        "description" => metadata.description = Some(text),
                        "subject" => metadata.subjects.push(text),
                        "date" => metadata.date = Some(text),
                        "rights" => metadata.rights = Some(text),
                        _ => {}
                    }
                    current_element = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let ncx_href = toc_id
        .as_deref()
        .and_then(|id| manifest.iter().find(|item| item.id == id))
        .or_else(|| {
            manifest
                .iter()
                .find(|item| item.media_type == "application/x-dtbncx+xml")
        })
        .map(|item| item.href.clone());

    Ok(Package {
        metadata,
        manifest,
        spine,
        ncx_href,
        base_dir: base_dir.to_string(),
    })
}

/// Parse an NCX navigation map into a flat, play-ordered entry list.
///
/// Nested navPoints are flattened depth-first, parents before children.
/// `content src` values are resolved against `base_dir`, the NCX's own
/// directory in the archive.
pub fn parse_ncx(content: &str, base_dir: &str) -> Result<Vec<NavPoint>> {
    let mut reader = Reader::from_str(content);

    struct NavPointState {
        slot: usize,
        id: Option<String>,
        text: Option<String>,
        src: Option<String>,
    }

    // Slots are reserved at <navPoint> so parents keep their place ahead of
    // children that finish first.
    let mut slots: Vec<Option<NavPoint>> = Vec::new();
    let mut stack: Vec<NavPointState> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"navPoint" => {
                    stack.push(NavPointState {
                        slot: slots.len(),
                        id: attribute(&e, b"id")?,
                        text: None,
                        src: None,
                    });
                    slots.push(None);
                }
                b"text" => in_text = true,
                b"content" => {
                    if let Some(state) = stack.last_mut() {
                        state.src = attribute(&e, b"src")?.map(|src| src.trim().to_string());
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if local_name(e.name().as_ref()) == b"content"
                    && let Some(state) = stack.last_mut()
                {
                    state.src = attribute(&e, b"src")?.map(|src| src.trim().to_string());
                }
            }
            Event::Text(e) => {
                if in_text && let Some(state) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    state.text.get_or_insert_with(String::new).push_str(&raw);
                }
            }
            Event::GeneralRef(e) => {
                if in_text && let Some(state) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        state.text.get_or_insert_with(String::new).push_str(&resolved);
                    }
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"text" => in_text = false,
                b"navPoint" => {
                    if let Some(state) = stack.pop() {
                        let label = state.text.as_deref().map(str::trim).unwrap_or_default().to_string();
                        slots[state.slot] = match (state.src, state.id) {
                            (Some(src), _) if !src.is_empty() => {
                                Some(NavPoint::new(label, resolve_path(base_dir, &src)))
                            }
                            (_, Some(id)) => Some(NavPoint::from_manifest_id(label, id)),
                            _ => None,
                        };
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn manifest_item(e: &BytesStart<'_>) -> Result<Option<ManifestItem>> {
    let Some(id) = attribute(e, b"id")?.filter(|id| !id.is_empty()) else {
        return Ok(None);
    };

    Ok(Some(ManifestItem {
        id,
        href: attribute(e, b"href")?.unwrap_or_default(),
        media_type: attribute(e, b"media-type")?.unwrap_or_default(),
        properties: attribute(e, b"properties")?,
    }))
}

/// Raw (unescaped-as-written) value of an attribute, by local name.
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(String::from_utf8(attr.value.to_vec())?));
        }
    }
    Ok(None)
}

/// Strip UTF-8 BOM if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve XML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };

    code.and_then(char::from_u32).map(|c| c.to_string())
}
