// Run with: cargo bench --bench overlay_performance

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use lopdf::{dictionary, Document, Object, Stream};
use signme_core::features::compositor::{apply_image, ImageKind, OverlayImage};
use signme_core::features::geometry::Rect;

fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|i| {
            let body = format!("BT 72 760 Td (Page {}) Tj ET\n", i + 1);
            let content_id = doc.add_object(Stream::new(dictionary! {}, body.into_bytes()));
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save sample pdf");
    out
}

fn sample_png(size: u32, alpha: u8) -> Vec<u8> {
    let pixels: Vec<u8> = (0..size * size)
        .flat_map(|i| [(i % 251) as u8, 40, 90, alpha])
        .collect();
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&pixels, size, size, ColorType::Rgba8)
        .expect("encode sample png");
    out
}

fn benchmark_overlay(c: &mut Criterion) {
    let pdf = sample_pdf(20);
    let rect = Rect::new(400.0, 60.0, 120.0, 120.0);

    let opaque = OverlayImage {
        bytes: sample_png(200, 255),
        hint: Some(ImageKind::Png),
    };
    c.bench_function("overlay_qr_sized_opaque_png", |b| {
        b.iter(|| black_box(apply_image(black_box(&pdf), &opaque, rect, 10).expect("overlay")))
    });

    let translucent = OverlayImage {
        bytes: sample_png(600, 128),
        hint: Some(ImageKind::Png),
    };
    c.bench_function("overlay_large_signature_with_smask", |b| {
        b.iter(|| {
            black_box(apply_image(black_box(&pdf), &translucent, rect, 19).expect("overlay"))
        })
    });
}

criterion_group!(benches, benchmark_overlay);
criterion_main!(benches);
