//! Burn annotations into PDF page content
//!
//! Every annotation becomes ordinary vector content appended to its page, so
//! the exported file shows them in any viewer. Page rotation is not applied;
//! coordinates map onto the unrotated media box.

use annotator_core::annotation::{
    group_by_page, Annotation, AnnotationGeometry, Color, CoordinateSpace, HighlightShape,
    PagePoint, PageRect,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

const FONT_NAME: &str = "AnnF1";
const LINE_HEIGHT: f32 = 1.2;
const LETTER: PageBox = PageBox { llx: 0.0, lly: 0.0, urx: 612.0, ury: 792.0 };

#[derive(Debug, thiserror::Error)]
pub enum FlattenError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("encrypted PDFs are not supported")]
    Encrypted,
    #[error("document has no pages")]
    NoPages,
    #[error("failed to write PDF: {0}")]
    Write(String),
}

/// Unrotated media box in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
struct PageBox {
    llx: f32,
    lly: f32,
    urx: f32,
    ury: f32,
}

impl PageBox {
    fn width(&self) -> f32 {
        self.urx - self.llx
    }

    fn height(&self) -> f32 {
        self.ury - self.lly
    }

    /// Normalized top-left-origin point to PDF user space
    fn map(&self, point: PagePoint) -> (f32, f32) {
        (self.llx + point.x * self.width(), self.ury - point.y * self.height())
    }
}

/// Collects drawing operations for one page
struct PagePainter {
    bounds: PageBox,
    operations: Vec<Operation>,
    ext_gstates: Vec<(String, f32)>,
    uses_font: bool,
}

impl PagePainter {
    fn new(bounds: PageBox) -> Self {
        Self { bounds, operations: Vec::new(), ext_gstates: Vec::new(), uses_font: false }
    }

    fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    fn color(&mut self, operator: &str, color: Color) {
        let channel = |c: u8| Object::from(f32::from(c) / 255.0);
        self.op(operator, vec![channel(color.r), channel(color.g), channel(color.b)]);
    }

    fn opacity(&mut self, opacity: f32) {
        let name = format!("AnnGS{}", self.ext_gstates.len());
        self.ext_gstates.push((name.clone(), opacity.clamp(0.0, 1.0)));
        self.op("gs", vec![Object::Name(name.into_bytes())]);
    }

    fn polyline(&mut self, points: &[PagePoint], color: Color, width: f32) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.color("RG", color);
        self.op("w", vec![width.into()]);
        self.op("J", vec![Object::Integer(1)]);
        self.op("j", vec![Object::Integer(1)]);

        let (x, y) = self.bounds.map(*first);
        self.op("m", vec![x.into(), y.into()]);
        if rest.is_empty() {
            // A single tap still leaves a round dot.
            self.op("l", vec![x.into(), y.into()]);
        }
        for point in rest {
            let (x, y) = self.bounds.map(*point);
            self.op("l", vec![x.into(), y.into()]);
        }
        self.op("S", vec![]);
    }

    fn rect(&mut self, rect: &PageRect) {
        let (x, top) = self.bounds.map(PagePoint::new(rect.x, rect.y));
        let width = rect.width * self.bounds.width();
        let height = rect.height * self.bounds.height();
        self.op("re", vec![x.into(), (top - height).into(), width.into(), height.into()]);
    }

    fn text(&mut self, rect: &PageRect, text: &str, color: Color, font_size: f32) {
        let (x, top) = self.bounds.map(PagePoint::new(rect.x, rect.y));
        self.uses_font = true;
        self.color("rg", color);
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(FONT_NAME.as_bytes().to_vec()), font_size.into()]);
        self.op("TL", vec![(font_size * LINE_HEIGHT).into()]);
        self.op("Td", vec![x.into(), (top - font_size).into()]);
        for (index, line) in text.lines().enumerate() {
            if index > 0 {
                self.op("T*", vec![]);
            }
            self.op("Tj", vec![Object::String(win_ansi(line), StringFormat::Literal)]);
        }
        self.op("ET", vec![]);
    }

    fn paint(&mut self, annotation: &Annotation) {
        let mut annotation = annotation.clone();
        if annotation.space() == CoordinateSpace::LegacyPixels {
            annotation.migrate_legacy(self.bounds.width(), self.bounds.height());
        }
        if let Err(err) = annotation.geometry().validate() {
            tracing::warn!(id = annotation.id(), %err, "skipping annotation with invalid geometry");
            return;
        }

        self.op("q", vec![]);
        match annotation.geometry() {
            AnnotationGeometry::Ink { points, color, width } => {
                self.polyline(points, *color, *width);
            }
            AnnotationGeometry::Highlight { shape, color, width, opacity } => {
                self.opacity(*opacity);
                match shape {
                    HighlightShape::Rect(rect) => {
                        self.color("rg", *color);
                        self.rect(rect);
                        self.op("f", vec![]);
                    }
                    HighlightShape::Stroke(points) => self.polyline(points, *color, *width),
                }
            }
            AnnotationGeometry::FreeText { rect, text, style } => {
                self.text(rect, text, style.color, style.font_size);
            }
        }
        self.op("Q", vec![]);
    }

    fn finish(self) -> Result<(Vec<u8>, Vec<(String, f32)>, bool), FlattenError> {
        // Restore the graphics state left by the original content first.
        let mut operations = vec![Operation::new("Q", vec![])];
        operations.extend(self.operations);
        let mut bytes = b"\n".to_vec();
        bytes.extend(Content { operations }.encode()?);
        Ok((bytes, self.ext_gstates, self.uses_font))
    }
}

/// Encode for the standard Helvetica font; unmappable characters become `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars().filter(|c| !c.is_control()).map(win_ansi_byte).collect()
}

/// WinAnsiEncoding code for `c`; 0x80..=0x9F hold the cp1252 punctuation
fn win_ansi_byte(c: char) -> u8 {
    match c {
        '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => b'?',
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, FlattenError> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// Look up an inheritable page attribute, walking up the page tree
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Result<Option<&'a Object>, FlattenError> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let dict = doc.get_dictionary(id)?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(resolve(doc, value)?));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Ok(None)
}

fn page_box(doc: &Document, page_id: ObjectId) -> Result<PageBox, FlattenError> {
    let parsed = inherited(doc, page_id, b"MediaBox")?
        .and_then(|object| object.as_array().ok())
        .filter(|array| array.len() == 4)
        .and_then(|array| {
            let values: Vec<f32> = array.iter().filter_map(number).collect();
            (values.len() == 4).then(|| PageBox {
                llx: values[0].min(values[2]),
                lly: values[1].min(values[3]),
                urx: values[0].max(values[2]),
                ury: values[1].max(values[3]),
            })
        });
    Ok(parsed.unwrap_or_else(|| {
        tracing::warn!(?page_id, "page has no usable MediaBox, assuming Letter");
        LETTER
    }))
}

/// Copy of a resource sub-dictionary (`Font`, `ExtGState`), references resolved
fn resource_category(doc: &Document, resources: &Dictionary, key: &[u8]) -> Result<Dictionary, FlattenError> {
    match resources.get(key) {
        Ok(object) => Ok(resolve(doc, object)?.as_dict()?.clone()),
        Err(_) => Ok(Dictionary::new()),
    }
}

/// Give the page its own resource dictionary with our font and states added
fn install_resources(
    doc: &mut Document,
    page_id: ObjectId,
    ext_gstates: &[(String, f32)],
    uses_font: bool,
) -> Result<(), FlattenError> {
    let mut resources = match inherited(doc, page_id, b"Resources")? {
        Some(object) => object.as_dict()?.clone(),
        None => Dictionary::new(),
    };

    if uses_font {
        let mut fonts = resource_category(doc, &resources, b"Font")?;
        fonts.set(
            FONT_NAME,
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            },
        );
        resources.set("Font", fonts);
    }

    if !ext_gstates.is_empty() {
        let mut states = resource_category(doc, &resources, b"ExtGState")?;
        for (name, opacity) in ext_gstates {
            states.set(
                name.as_str(),
                dictionary! {
                    "Type" => "ExtGState",
                    "CA" => *opacity,
                    "ca" => *opacity,
                },
            );
        }
        resources.set("ExtGState", states);
    }

    doc.get_object_mut(page_id)?.as_dict_mut()?.set("Resources", resources);
    Ok(())
}

/// Bracket the existing content in `q`/`Q` and append the overlay stream
fn append_overlay(doc: &mut Document, page_id: ObjectId, overlay: Vec<u8>) -> Result<(), FlattenError> {
    let prefix = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let suffix = doc.add_object(Stream::new(Dictionary::new(), overlay));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    let mut contents = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    contents.insert(0, Object::Reference(prefix));
    contents.push(Object::Reference(suffix));
    page.set("Contents", contents);
    Ok(())
}

/// Draw `annotations` into a copy of `pdf` and return the new file
///
/// Annotations on pages the document does not have are skipped with a
/// warning, as are annotations whose geometry fails validation.
pub fn flatten_annotations(pdf: &[u8], annotations: &[Annotation]) -> Result<Vec<u8>, FlattenError> {
    if pdf.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(FlattenError::Encrypted);
    }

    let mut doc = Document::load_mem(pdf)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(FlattenError::NoPages);
    }

    let mut flattened = 0usize;
    for (page, list) in group_by_page(annotations.iter().cloned()) {
        let Some(&page_id) = pages.get(&page) else {
            tracing::warn!(page, count = list.len(), "skipping annotations on missing page");
            continue;
        };

        let mut painter = PagePainter::new(page_box(&doc, page_id)?);
        for annotation in &list {
            painter.paint(annotation);
        }
        if painter.is_empty() {
            continue;
        }

        let (content, ext_gstates, uses_font) = painter.finish()?;
        install_resources(&mut doc, page_id, &ext_gstates, uses_font)?;
        append_overlay(&mut doc, page_id, content)?;
        flattened += list.len();
    }
    tracing::debug!(flattened, pages = pages.len(), "flattened annotations");

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| FlattenError::Write(e.to_string()))?;
    Ok(output)
}

/// Number of pages in `pdf`
pub fn page_count(pdf: &[u8]) -> Result<u32, FlattenError> {
    let doc = Document::load_mem(pdf)?;
    Ok(doc.get_pages().len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotator_core::annotation::TextStyle;

    fn blank_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for _ in 0..pages {
            let content_id = doc.add_object(Stream::new(dictionary! {}, b"0 0 m 10 10 l S\n".to_vec()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(pages as i64),
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ],
                "Resources" => dictionary! {
                    "Font" => dictionary! {
                        "F1" => dictionary! {
                            "Type" => "Font",
                            "Subtype" => "Type1",
                            "BaseFont" => "Courier",
                        },
                    },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("pdf should serialize");
        bytes
    }

    fn operations(pdf: &[u8], page: u32) -> (Document, Vec<Operation>) {
        let doc = Document::load_mem(pdf).expect("output should parse");
        let page_id = doc.get_pages()[&page];
        let content = doc.get_page_content(page_id).expect("page content");
        let ops = Content::decode(&content).expect("content should decode").operations;
        (doc, ops)
    }

    fn operators(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|op| op.operator.as_str()).collect()
    }

    fn ink(page: u32) -> Annotation {
        Annotation::new(
            page,
            AnnotationGeometry::Ink {
                points: vec![PagePoint::new(0.0, 0.0), PagePoint::new(0.5, 0.5)],
                color: Color::RED,
                width: 2.0,
            },
        )
    }

    #[test]
    fn ink_maps_to_pdf_user_space() {
        let output = flatten_annotations(&blank_pdf(1), &[ink(1)]).unwrap();
        let (_, ops) = operations(&output, 1);

        let moves: Vec<&Operation> = ops.iter().filter(|op| op.operator == "m").collect();
        // Original content's move plus ours.
        assert_eq!(moves.len(), 2);
        let ours = moves[1];
        assert_eq!(ours.operands[0].as_float().unwrap(), 0.0);
        assert_eq!(ours.operands[1].as_float().unwrap(), 792.0);

        let line = ops.iter().rfind(|op| op.operator == "l").unwrap();
        assert_eq!(line.operands[0].as_float().unwrap(), 306.0);
        assert_eq!(line.operands[1].as_float().unwrap(), 396.0);
    }

    #[test]
    fn original_content_is_isolated() {
        let output = flatten_annotations(&blank_pdf(1), &[ink(1)]).unwrap();
        let (_, ops) = operations(&output, 1);
        let names = operators(&ops);

        assert_eq!(names.first(), Some(&"q"));
        let restore = names.iter().position(|name| *name == "Q").unwrap();
        // The original stroke sits between the outer q and its Q.
        assert!(names[..restore].contains(&"S"));
        assert!(names[restore..].contains(&"RG"));
    }

    #[test]
    fn highlight_and_text_install_resources() {
        let highlight = Annotation::new(
            1,
            AnnotationGeometry::Highlight {
                shape: HighlightShape::Rect(PageRect::new(0.1, 0.1, 0.5, 0.05)),
                color: Color::YELLOW,
                width: 16.0,
                opacity: 0.35,
            },
        );
        let note = Annotation::new(
            1,
            AnnotationGeometry::FreeText {
                rect: PageRect::new(0.5, 0.5, 0.3, 0.05),
                text: "first line\nsecond – line".to_owned(),
                style: TextStyle::default(),
            },
        );

        let output = flatten_annotations(&blank_pdf(1), &[highlight, note]).unwrap();
        let (doc, ops) = operations(&output, 1);
        let names = operators(&ops);
        assert!(names.contains(&"gs"));
        assert!(names.contains(&"re"));
        assert_eq!(names.iter().filter(|name| **name == "Tj").count(), 2);
        assert!(names.contains(&"T*"));

        let page_id = doc.get_pages()[&1];
        let resources = doc.get_dictionary(page_id).unwrap().get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(b"F1"), "inherited fonts are kept");
        assert!(fonts.has(FONT_NAME.as_bytes()));
        let states = resources.get(b"ExtGState").unwrap().as_dict().unwrap();
        let state = states.get(b"AnnGS0").unwrap().as_dict().unwrap();
        assert!((state.get(b"ca").unwrap().as_float().unwrap() - 0.35).abs() < 1e-6);
    }

    #[test]
    fn legacy_pixels_use_page_size() {
        let legacy = Annotation::from_parts(
            "legacy".to_owned(),
            1,
            CoordinateSpace::LegacyPixels,
            AnnotationGeometry::Ink {
                points: vec![PagePoint::new(306.0, 396.0)],
                color: Color::BLACK,
                width: 1.0,
            },
            "2024-01-01T00:00:00Z".to_owned(),
            None,
        );
        let output = flatten_annotations(&blank_pdf(1), &[legacy]).unwrap();
        let (_, ops) = operations(&output, 1);
        let dot = ops.iter().rfind(|op| op.operator == "l").unwrap();
        assert_eq!(dot.operands[0].as_float().unwrap(), 306.0);
        assert_eq!(dot.operands[1].as_float().unwrap(), 396.0);
    }

    #[test]
    fn annotations_on_missing_pages_are_skipped() {
        let output = flatten_annotations(&blank_pdf(2), &[ink(2), ink(9)]).unwrap();
        assert_eq!(page_count(&output).unwrap(), 2);
        let (_, first) = operations(&output, 1);
        assert!(!operators(&first).contains(&"RG"));
        let (_, second) = operations(&output, 2);
        assert!(operators(&second).contains(&"RG"));
    }

    #[test]
    fn rejects_garbage_and_encrypted_input() {
        assert!(matches!(flatten_annotations(b"not a pdf", &[]), Err(FlattenError::Pdf(_))));
        let mut encrypted = blank_pdf(1);
        encrypted.extend_from_slice(b"\n/Encrypt 5 0 R\n");
        assert!(matches!(flatten_annotations(&encrypted, &[]), Err(FlattenError::Encrypted)));
    }

    #[test]
    fn win_ansi_replaces_unmappable_characters() {
        assert_eq!(win_ansi("café"), b"caf\xe9".to_vec());
        assert_eq!(win_ansi("a→b"), b"a?b".to_vec());
        assert_eq!(win_ansi("tab\there"), b"tabhere".to_vec());
        assert_eq!(win_ansi("x\u{81}y"), b"xy".to_vec());
    }

    #[test]
    fn win_ansi_maps_typographic_punctuation() {
        assert_eq!(win_ansi("5€"), b"5\x80".to_vec());
        assert_eq!(win_ansi("“ok” – done…"), b"\x93ok\x94 \x96 done\x85".to_vec());
        assert_eq!(win_ansi("it’s ™ • Œ"), b"it\x92s \x99 \x95 \x8c".to_vec());
        assert_eq!(win_ansi("ÿ¡"), b"\xff\xa1".to_vec());
    }
}
