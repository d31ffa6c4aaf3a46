//! Container, package and navigation parsing
//!
//! `META-INF/container.xml` → OPF (metadata, manifest, spine) → spine content
//! documents → table of contents from the EPUB 3 nav document, the NCX, or
//! the spine itself as a last resort.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use roxmltree::{Document as XmlDocument, Node};
use zip::ZipArchive;

use super::content::ContentTree;
use super::{BookMetadata, Document, EpubError, Section, TocEntry};
use crate::cfi::{section_builder, Cfi};

const OPS_NAMESPACE: &str = "http://www.idpf.org/2007/ops";

/// Manifest item from the OPF
#[derive(Debug, Clone)]
struct ManifestItem {
    /// Archive path
    href: String,
    media_type: String,
    properties: Option<String>,
}

enum TocSource {
    Nav(String),
    Ncx(String),
    None,
}

/// Parse an EPUB container held in memory
pub fn parse_container(data: &[u8]) -> Result<Document, EpubError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let opf_path = find_opf_path(&mut archive)?;
    let opf_dir = parent_dir(&opf_path);
    let opf_content = read_file(&mut archive, &opf_path)?;
    let opf = XmlDocument::parse(&opf_content).map_err(|e| EpubError::XmlError(e.to_string()))?;

    let metadata = parse_metadata(&opf);
    let manifest = parse_manifest(&opf, &opf_dir);
    let spine_refs = parse_spine(&opf);

    if spine_refs.is_empty() {
        return Err(EpubError::InvalidEpub("spine is empty".to_string()));
    }

    let mut sections = Vec::with_capacity(spine_refs.len());
    for (idref, linear) in spine_refs {
        let item = manifest
            .get(&idref)
            .ok_or_else(|| EpubError::InvalidEpub(format!("spine idref {} not in manifest", idref)))?;
        let content = read_bytes(&mut archive, &item.href)?;
        let xhtml = String::from_utf8_lossy(&content).into_owned();
        let tree = ContentTree::parse(&xhtml)
            .map_err(|e| EpubError::InvalidEpub(format!("{}: {}", item.href, e)))?;
        sections.push(Section {
            id: idref,
            href: item.href.clone(),
            linear,
            content,
            tree,
        });
    }

    let mut document = Document {
        metadata,
        sections,
        toc: Vec::new(),
    };

    let toc = match find_toc_source(&opf, &manifest) {
        TocSource::Nav(href) => read_file(&mut archive, &href)
            .ok()
            .and_then(|xml| parse_nav_document(&xml, &parent_dir(&href), &document)),
        TocSource::Ncx(href) => read_file(&mut archive, &href)
            .ok()
            .and_then(|xml| parse_ncx_document(&xml, &parent_dir(&href), &document)),
        TocSource::None => None,
    };
    document.toc = match toc {
        Some(entries) if !entries.is_empty() => entries,
        _ => {
            tracing::debug!("No usable navigation document, generating toc from spine");
            generate_toc_from_spine(&document)
        }
    };

    Ok(document)
}

fn find_opf_path<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Result<String, EpubError> {
    let container = read_file(archive, "META-INF/container.xml")?;
    let doc = XmlDocument::parse(&container).map_err(|e| EpubError::XmlError(e.to_string()))?;
    doc.descendants()
        .find(|n| n.tag_name().name() == "rootfile")
        .and_then(|n| n.attribute("full-path"))
        .map(|s| s.to_string())
        .ok_or_else(|| EpubError::InvalidEpub("container.xml has no rootfile".to_string()))
}

fn read_bytes<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>, EpubError> {
    let mut file = archive.by_name(path).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => EpubError::ResourceNotFound(path.to_string()),
        other => EpubError::ZipError(other),
    })?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

fn read_file<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String, EpubError> {
    let bytes = read_bytes(archive, path)?;
    String::from_utf8(bytes).map_err(|e| EpubError::InvalidEpub(format!("{} is not UTF-8: {}", path, e)))
}

fn parse_metadata(doc: &XmlDocument) -> BookMetadata {
    let mut metadata = BookMetadata::default();
    let Some(meta) = doc.descendants().find(|n| n.tag_name().name() == "metadata") else {
        return metadata;
    };

    for node in meta.children().filter(|n| n.is_element()) {
        let text = node.text().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        match node.tag_name().name() {
            "title" if metadata.title.is_empty() => {
                metadata.title = text.unwrap_or_default();
            }
            "creator" => metadata.creators.extend(text),
            "language" if metadata.language.is_none() => metadata.language = text,
            "identifier" if metadata.identifier.is_none() => metadata.identifier = text,
            _ => {}
        }
    }
    metadata
}

fn parse_manifest(doc: &XmlDocument, opf_dir: &str) -> HashMap<String, ManifestItem> {
    doc.descendants()
        .filter(|n| n.tag_name().name() == "item")
        .filter_map(|n| {
            let id = n.attribute("id")?;
            let href = n.attribute("href")?;
            Some((
                id.to_string(),
                ManifestItem {
                    href: resolve_href(opf_dir, href),
                    media_type: n.attribute("media-type").unwrap_or_default().to_string(),
                    properties: n.attribute("properties").map(|s| s.to_string()),
                },
            ))
        })
        .collect()
}

fn parse_spine(doc: &XmlDocument) -> Vec<(String, bool)> {
    doc.descendants()
        .filter(|n| n.tag_name().name() == "itemref")
        .filter_map(|n| {
            let idref = n.attribute("idref")?;
            let linear = n.attribute("linear") != Some("no");
            Some((idref.to_string(), linear))
        })
        .collect()
}

fn find_toc_source(doc: &XmlDocument, manifest: &HashMap<String, ManifestItem>) -> TocSource {
    let nav = manifest.values().find(|item| {
        item.properties
            .as_deref()
            .map_or(false, |p| p.split_whitespace().any(|prop| prop == "nav"))
    });
    if let Some(item) = nav {
        return TocSource::Nav(item.href.clone());
    }

    let spine_toc = doc
        .descendants()
        .find(|n| n.tag_name().name() == "spine")
        .and_then(|n| n.attribute("toc"))
        .and_then(|id| manifest.get(id));
    let ncx = spine_toc.or_else(|| {
        manifest
            .values()
            .find(|item| item.media_type == "application/x-dtbncx+xml")
    });
    match ncx {
        Some(item) => TocSource::Ncx(item.href.clone()),
        None => TocSource::None,
    }
}

fn parse_nav_document(xml: &str, base_dir: &str, document: &Document) -> Option<Vec<TocEntry>> {
    let normalized = super::content::normalize_entities(xml);
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = XmlDocument::parse_with_options(&normalized, options).ok()?;

    let navs: Vec<Node> = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "nav")
        .collect();
    let toc_nav = navs
        .iter()
        .find(|n| {
            n.attribute((OPS_NAMESPACE, "type")) == Some("toc") || n.attribute("type") == Some("toc")
        })
        .or_else(|| navs.first())?;

    let list = toc_nav.children().find(|n| n.tag_name().name() == "ol")?;
    Some(parse_nav_list(list, base_dir, document))
}

fn parse_nav_list(list: Node, base_dir: &str, document: &Document) -> Vec<TocEntry> {
    list.children()
        .filter(|n| n.tag_name().name() == "li")
        .filter_map(|li| {
            let link = li
                .children()
                .find(|n| matches!(n.tag_name().name(), "a" | "span"))?;
            let label = collect_text(link);
            let href = link
                .attribute("href")
                .map(|h| resolve_href(base_dir, h))
                .unwrap_or_default();
            let children = li
                .children()
                .find(|n| n.tag_name().name() == "ol")
                .map(|ol| parse_nav_list(ol, base_dir, document))
                .unwrap_or_default();
            Some(TocEntry {
                target: resolve_toc_target(document, &href),
                label,
                href,
                children,
            })
        })
        .collect()
}

fn parse_ncx_document(xml: &str, base_dir: &str, document: &Document) -> Option<Vec<TocEntry>> {
    let doc = XmlDocument::parse(xml).ok()?;
    let nav_map = doc.descendants().find(|n| n.tag_name().name() == "navMap")?;
    Some(parse_nav_points(nav_map, base_dir, document))
}

fn parse_nav_points(parent: Node, base_dir: &str, document: &Document) -> Vec<TocEntry> {
    parent
        .children()
        .filter(|n| n.tag_name().name() == "navPoint")
        .map(|point| {
            let label = point
                .descendants()
                .find(|n| n.tag_name().name() == "text")
                .map(collect_text)
                .unwrap_or_default();
            let href = point
                .children()
                .find(|n| n.tag_name().name() == "content")
                .and_then(|n| n.attribute("src"))
                .map(|src| resolve_href(base_dir, src))
                .unwrap_or_default();
            TocEntry {
                target: resolve_toc_target(document, &href),
                label,
                href,
                children: parse_nav_points(point, base_dir, document),
            }
        })
        .collect()
}

fn generate_toc_from_spine(document: &Document) -> Vec<TocEntry> {
    document
        .sections
        .iter()
        .enumerate()
        .filter(|(_, section)| section.linear)
        .map(|(index, section)| TocEntry {
            label: section
                .tree
                .text
                .split_whitespace()
                .take(6)
                .collect::<Vec<_>>()
                .join(" "),
            href: section.href.clone(),
            target: Some(section_start_cfi(index, section)),
            children: Vec::new(),
        })
        .collect()
}

/// Map `path#fragment` onto an address in the loaded document
fn resolve_toc_target(document: &Document, href: &str) -> Option<Cfi> {
    let (path, fragment) = match href.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (href, None),
    };
    let (index, section) = document.section_by_href(path)?;

    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        if let Some((steps, _)) = section.tree.find_id(fragment) {
            let mut builder = section_builder(index, section);
            for (depth, step) in steps.iter().enumerate() {
                builder = if depth + 1 == steps.len() {
                    builder.element_raw_with_id(*step, fragment)
                } else {
                    builder.element_raw(*step)
                };
            }
            return Some(builder.build());
        }
        tracing::debug!("Fragment #{} not found in {}, using section start", fragment, path);
    }
    Some(section_start_cfi(index, section))
}

fn section_start_cfi(index: usize, section: &Section) -> Cfi {
    section_builder(index, section).build()
}

fn collect_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parent_dir(path: &str) -> String {
    path.rsplit_once('/')
        .map(|(dir, _)| dir.to_string())
        .unwrap_or_default()
}

/// Resolve an href relative to `base_dir`, normalizing `.` and `..`
fn resolve_href(base_dir: &str, href: &str) -> String {
    let decoded = urlencoding::decode(href)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string());

    let (path, fragment) = match decoded.split_once('#') {
        Some((p, f)) => (p.to_string(), Some(f.to_string())),
        None => (decoded, None),
    };

    let mut parts: Vec<&str> = if path.is_empty() || base_dir.is_empty() || path.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').collect()
    };
    for segment in path.trim_start_matches('/').split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match fragment {
        Some(f) => format!("{}#{}", joined, f),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::fixtures;

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/nav", "../text/ch1.xhtml#s1"), "OEBPS/text/ch1.xhtml#s1");
        assert_eq!(resolve_href("", "ch%201.xhtml"), "ch 1.xhtml");
    }

    #[test]
    fn test_parse_sample_package() {
        let doc = parse_container(&fixtures::sample_epub()).unwrap();
        assert_eq!(doc.metadata.title, "The Sample Book");
        assert_eq!(doc.metadata.creators, vec!["Ana Autora".to_string()]);
        assert_eq!(doc.metadata.language.as_deref(), Some("en"));
        assert_eq!(doc.sections.len(), 3);
        assert_eq!(doc.sections[0].id, "ch1");
        assert_eq!(doc.sections[0].href, "OEBPS/ch1.xhtml");
    }

    #[test]
    fn test_nav_toc_with_nested_entries() {
        let doc = parse_container(&fixtures::sample_epub()).unwrap();
        let labels: Vec<&str> = doc.toc.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Chapter One", "Chapter Two", "Chapter Three"]);

        let nested = &doc.toc[2].children[0];
        assert_eq!(nested.label, "The Storm");
        let target = nested.target.as_ref().unwrap().to_string();
        assert!(target.starts_with("epubcfi(/6/6[ch3]!/4/"), "{}", target);
        assert!(target.contains("[storm]"), "{}", target);
    }

    #[test]
    fn test_ncx_fallback() {
        let doc = parse_container(&fixtures::ncx_epub()).unwrap();
        assert_eq!(doc.toc.len(), 2);
        assert_eq!(doc.toc[1].label, "Second");
        assert_eq!(doc.toc[1].target.as_ref().unwrap().spine_index(), Some(1));
    }

    #[test]
    fn test_spine_generated_toc() {
        let doc = parse_container(&fixtures::epub_without_toc()).unwrap();
        assert_eq!(doc.toc.len(), 1);
        assert_eq!(doc.toc[0].label, "Only chapter text here");
    }

    #[test]
    fn test_missing_container_is_invalid() {
        let bytes = fixtures::build_epub(&[("mimetype", "application/epub+zip")]);
        assert!(parse_container(&bytes).is_err());
    }

    #[test]
    fn test_empty_spine_is_invalid() {
        let bytes = fixtures::build_epub(&[
            ("META-INF/container.xml", fixtures::CONTAINER_XML),
            (
                "OEBPS/content.opf",
                r#"<package xmlns="http://www.idpf.org/2007/opf"><metadata/><manifest/><spine/></package>"#,
            ),
        ]);
        assert!(matches!(
            parse_container(&bytes),
            Err(EpubError::InvalidEpub(_))
        ));
    }
}
