//! Location index benchmarks
//!
//! Indexing runs in the background after every open, so it has to stay well
//! under the time a reader spends on the first page.
//!
//! Run with: `cargo bench --bench location_index`

use std::io::{Cursor, Write};
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use los_libros_reader::cfi::{self, TextPoint};
use los_libros_reader::epub::Document;
use los_libros_reader::locations::{LocationIndex, DEFAULT_CHUNK_SIZE};

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const PARAGRAPH: &str = "It was a bright cold day in April, and the clocks were striking thirteen. \
Winston Smith, his chin nuzzled into his breast in an effort to escape the vile wind, \
slipped quickly through the glass doors of Victory Mansions.";

/// EPUB with `chapters` chapters of `paragraphs` paragraphs each
fn create_book(chapters: usize, paragraphs: usize) -> Vec<u8> {
    let items: String = (1..=chapters)
        .map(|i| format!(r#"<item id="c{i}" href="c{i}.xhtml" media-type="application/xhtml+xml"/>"#))
        .collect();
    let refs: String = (1..=chapters)
        .map(|i| format!(r#"<itemref idref="c{i}"/>"#))
        .collect();
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">benchmark-book</dc:identifier>
    <dc:title>Benchmark Book</dc:title>
  </metadata>
  <manifest>{items}</manifest>
  <spine>{refs}</spine>
</package>"#
    );
    let body: String = (0..paragraphs).map(|_| format!("<p>{}</p>", PARAGRAPH)).collect();
    let chapter = format!(
        r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Chapter</title></head><body><h1>Chapter</h1>{body}</body></html>"#
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file("mimetype", options).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.start_file("META-INF/container.xml", options).unwrap();
    zip.write_all(CONTAINER_XML.as_bytes()).unwrap();
    zip.start_file("OEBPS/content.opf", options).unwrap();
    zip.write_all(opf.as_bytes()).unwrap();
    for i in 1..=chapters {
        zip.start_file(format!("OEBPS/c{i}.xhtml"), options).unwrap();
        zip.write_all(chapter.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("epub_parsing");
    group.measurement_time(Duration::from_secs(5));

    for chapters in [1, 10, 40] {
        let data = create_book(chapters, 50);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("chapters", chapters), &data, |b, data| {
            b.iter(|| Document::from_bytes(black_box(data)).unwrap())
        });
    }

    group.finish();
}

fn bench_indexing(c: &mut Criterion) {
    let document = Document::from_bytes(&create_book(40, 50)).unwrap();
    let mut group = c.benchmark_group("location_index");
    group.throughput(Throughput::Elements(document.char_len() as u64));

    for chunk_size in [256, DEFAULT_CHUNK_SIZE, 4096] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk_size), &chunk_size, |b, &chunk_size| {
            b.iter(|| LocationIndex::build(black_box(&document), chunk_size).unwrap())
        });
    }

    group.finish();
}

fn bench_lookups(c: &mut Criterion) {
    let document = Document::from_bytes(&create_book(40, 50)).unwrap();
    let index = LocationIndex::build(&document, DEFAULT_CHUNK_SIZE).unwrap();
    let point = TextPoint::new(20, 4000);
    let address = cfi::from_point(&document, &point).unwrap();

    let mut group = c.benchmark_group("lookups");
    group.bench_function("percentage", |b| b.iter(|| index.percentage(black_box(&point))));
    group.bench_function("cfi_for_percentage", |b| {
        b.iter(|| index.cfi_for_percentage(black_box(62.5)))
    });
    group.bench_function("resolve", |b| {
        b.iter(|| cfi::resolve(&document, black_box(&address)).unwrap())
    });
    group.bench_function("generate", |b| {
        b.iter(|| cfi::from_point(&document, black_box(&point)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_parsing, bench_indexing, bench_lookups);
criterion_main!(benches);
