//! In-memory EPUB fixtures for tests

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::Document;

pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Zip `files` into an EPUB container (stored, mimetype first)
pub fn build_epub(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file("mimetype", options).unwrap();
    writer.write_all(b"application/epub+zip").unwrap();
    for (name, content) in files {
        if *name == "mimetype" {
            continue;
        }
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn chapter(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>{title}</title></head>
<body>{body}</body>
</html>"#
    )
}

fn package(title: &str, ids: &[&str], extra_manifest: &str, spine_attrs: &str) -> String {
    let items: String = ids
        .iter()
        .map(|id| format!(r#"<item id="{id}" href="{id}.xhtml" media-type="application/xhtml+xml"/>"#))
        .collect();
    let refs: String = ids
        .iter()
        .map(|id| format!(r#"<itemref idref="{id}"/>"#))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:sample-book</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>Ana Autora</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>{items}{extra_manifest}</manifest>
  <spine{spine_attrs}>{refs}</spine>
</package>"#
    )
}

const NAV_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body>
  <nav epub:type="toc" id="toc">
    <ol>
      <li><a href="ch1.xhtml">Chapter One</a></li>
      <li><a href="ch2.xhtml">Chapter Two</a></li>
      <li><a href="ch3.xhtml">Chapter Three</a>
        <ol><li><a href="ch3.xhtml#storm">The Storm</a></li></ol>
      </li>
    </ol>
  </nav>
</body>
</html>"#;

/// Three chapters with an EPUB 3 nav document
pub fn sample_epub() -> Vec<u8> {
    let ch1 = chapter(
        "Chapter One",
        "<h1>Chapter One</h1><p>It was a bright cold day in April, and the clocks were striking thirteen.</p><p>Winston Smith slipped quickly through the glass doors.</p>",
    );
    let ch2 = chapter(
        "Chapter Two",
        "<h1>Chapter Two</h1><p>The hallway smelt of <em>boiled cabbage</em> and old rag mats.</p>",
    );
    let ch3 = chapter(
        "Chapter Three",
        r#"<h1>Chapter Three</h1><p>Outside, even through the shut window-pane, the world looked cold.</p><h2 id="storm">The Storm</h2><p>Down in the street little eddies of wind were whirling dust.</p>"#,
    );
    let opf = package(
        "The Sample Book",
        &["ch1", "ch2", "ch3"],
        r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#,
        "",
    );
    build_epub(&[
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", &opf),
        ("OEBPS/nav.xhtml", NAV_XHTML),
        ("OEBPS/ch1.xhtml", &ch1),
        ("OEBPS/ch2.xhtml", &ch2),
        ("OEBPS/ch3.xhtml", &ch3),
    ])
}

pub fn sample_document() -> Document {
    Document::from_bytes(&sample_epub()).unwrap()
}

/// Two chapters with an NCX table of contents only
pub fn ncx_epub() -> Vec<u8> {
    let ncx = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1" playOrder="1"><navLabel><text>First</text></navLabel><content src="a.xhtml"/></navPoint>
    <navPoint id="n2" playOrder="2"><navLabel><text>Second</text></navLabel><content src="b.xhtml"/></navPoint>
  </navMap>
</ncx>"#;
    let opf = package(
        "NCX Book",
        &["a", "b"],
        r#"<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#,
        r#" toc="ncx""#,
    );
    let a = chapter("A", "<p>First chapter.</p>");
    let b = chapter("B", "<p>Second chapter.</p>");
    build_epub(&[
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", &opf),
        ("OEBPS/toc.ncx", ncx),
        ("OEBPS/a.xhtml", &a),
        ("OEBPS/b.xhtml", &b),
    ])
}

/// One chapter, no navigation document at all
pub fn epub_without_toc() -> Vec<u8> {
    let opf = package("Bare Book", &["only"], "", "");
    let only = chapter("Only", "<p>Only chapter text here</p>");
    build_epub(&[
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", &opf),
        ("OEBPS/only.xhtml", &only),
    ])
}

/// Sections whose body is exactly `chars_per_section` characters of text
///
/// Each body is a single `<p>` with no surrounding whitespace, so text
/// offsets and location counts are easy to predict.
pub fn uniform_epub(sections: usize, chars_per_section: usize) -> Vec<u8> {
    let ids: Vec<String> = (0..sections).map(|i| format!("s{}", i + 1)).collect();
    let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    let opf = package("Uniform Book", &id_refs, "", "");

    let words = "abcd ".repeat(chars_per_section / 5 + 1);
    let text: String = words.chars().take(chars_per_section).collect();

    let chapters: Vec<(String, String)> = ids
        .iter()
        .map(|id| {
            (
                format!("OEBPS/{}.xhtml", id),
                format!(
                    "<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{id}</title></head><body><p>{text}</p></body></html>"
                ),
            )
        })
        .collect();

    let mut files: Vec<(&str, &str)> = vec![
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", &opf),
    ];
    for (name, content) in &chapters {
        files.push((name.as_str(), content.as_str()));
    }
    build_epub(&files)
}

pub fn uniform_document(sections: usize, chars_per_section: usize) -> Document {
    Document::from_bytes(&uniform_epub(sections, chars_per_section)).unwrap()
}
