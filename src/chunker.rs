//! Splitting large PDFs into page-bounded chunks.
//!
//! The OCR service limits how many pages it will accept in one request, so we
//! split long PDFs into consecutive runs of at most `max_pages_per_chunk`
//! pages. Each chunk is a complete, standalone PDF. Splitting is pure and
//! deterministic: the same bytes and chunk size always give the same chunks.

use std::{num::NonZeroUsize, ops::RangeInclusive};

use lopdf::{Document as PdfDocument, Object, ObjectId};
use thiserror::Error;

use crate::{document::Document, prelude::*};

/// Errors which can occur while splitting a document.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// The input could not be parsed into discrete pages.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// A contiguous run of pages from a larger document.
#[derive(Clone, Debug)]
pub struct Chunk {
    /// The zero-based position of this chunk.
    pub index: usize,

    /// The 1-based page numbers of the source document in this chunk.
    pub pages: RangeInclusive<usize>,

    /// The chunk itself, as a standalone document.
    pub document: Document,
}

impl Chunk {
    /// How many pages are in this chunk?
    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }
}

/// Count the pages in a PDF.
pub fn page_count(data: &[u8]) -> Result<usize, ChunkError> {
    Ok(load_pdf(data)?.get_pages().len())
}

fn load_pdf(data: &[u8]) -> Result<PdfDocument, ChunkError> {
    Ok(PdfDocument::load_mem(data)?)
}

impl From<lopdf::Error> for ChunkError {
    fn from(err: lopdf::Error) -> Self {
        ChunkError::InvalidDocument(err.to_string())
    }
}

/// Page attributes that a page may inherit from its ancestors in the page
/// tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Deeper page trees than this are treated as cyclic.
const MAX_TREE_DEPTH: usize = 64;

/// Copy inherited attributes onto each page, so the page keeps them once it
/// is re-parented directly under the root.
fn flatten_inherited_attributes(
    pdf: &mut PdfDocument,
    page_ids: &[ObjectId],
) -> Result<(), ChunkError> {
    for &page_id in page_ids {
        let mut inherited = vec![];
        let page = pdf.get_dictionary(page_id)?;
        for key in INHERITABLE_KEYS {
            if page.has(key) {
                continue;
            }
            let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
            for _ in 0..MAX_TREE_DEPTH {
                let Some(node_id) = parent else { break };
                let node = pdf.get_dictionary(node_id)?;
                if let Ok(value) = node.get(key) {
                    inherited.push((key, value.clone()));
                    break;
                }
                parent = node.get(b"Parent").and_then(Object::as_reference).ok();
            }
        }

        let page = pdf.get_dictionary_mut(page_id)?;
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
    Ok(())
}

/// Split `document` into chunks of at most `max_pages_per_chunk` pages.
///
/// If the whole document fits, we return it unchanged as a single chunk.
/// Otherwise every chunk but the last has exactly `max_pages_per_chunk` pages.
///
/// Each chunk starts from a copy of the whole document whose root page node
/// lists only the chunk's pages. Pruning then drops everything the other
/// pages used.
#[instrument(level = "debug", skip(document), fields(pages = document.page_count()))]
pub fn split(
    document: &Document,
    max_pages_per_chunk: NonZeroUsize,
) -> Result<Vec<Chunk>, ChunkError> {
    let mut pdf = load_pdf(document.data())?;
    // Sorted by page number.
    let page_ids = pdf.get_pages().into_values().collect::<Vec<ObjectId>>();
    let total_pages = page_ids.len();
    let max_pages = max_pages_per_chunk.get();

    if total_pages <= max_pages {
        return Ok(vec![Chunk {
            index: 0,
            pages: 1..=total_pages,
            document: document.clone(),
        }]);
    }

    flatten_inherited_attributes(&mut pdf, &page_ids)?;
    let root_id = pdf.catalog()?.get(b"Pages")?.as_reference()?;

    let mut chunks = Vec::with_capacity(total_pages.div_ceil(max_pages));
    for (index, keep) in page_ids.chunks(max_pages).enumerate() {
        let first_page = index * max_pages + 1;
        let pages = first_page..=(first_page + keep.len() - 1);
        debug!(chunk = index, ?pages, "extracting chunk");

        let mut chunk_pdf = pdf.clone();
        for &page_id in keep {
            chunk_pdf
                .get_dictionary_mut(page_id)?
                .set("Parent", Object::Reference(root_id));
        }
        let root = chunk_pdf.get_dictionary_mut(root_id)?;
        root.set(
            "Kids",
            keep.iter()
                .map(|&id| Object::Reference(id))
                .collect::<Vec<Object>>(),
        );
        root.set("Count", keep.len() as i64);
        chunk_pdf.prune_objects();

        let mut data = Vec::new();
        chunk_pdf
            .save_to(&mut data)
            .map_err(|err| ChunkError::InvalidDocument(err.to_string()))?;
        chunks.push(Chunk {
            index,
            pages,
            document: Document::from_pdf_bytes(data)?,
        });
    }
    Ok(chunks)
}
