//! Pipeline stages for document processing.
//!
//! Each submodule implements one step and is testable on its own. The
//! orchestration that sequences them lives in [`crate::process`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ document ──▶ render ─┬─▶ page ( encode ──▶ inference ──▶ parse )
//! (any)     (→ PDF)      (PNGs)  │
//!                      metadata ─┘
//! ```
//!
//! 1. [`tool`]      run an external executable and capture its output
//! 2. [`document`]  normalise office documents to PDF (LibreOffice)
//! 3. [`render`]    rasterise every PDF page to PNG (`pdftoppm`)
//! 4. [`metadata`]  read and type document metadata (`pdfinfo`)
//! 5. [`encode`]    base64-wrap a page image for the request body
//! 6. [`inference`] call the vision model; the only stage with network I/O
//! 7. [`parse`]     turn the reply into a payload for the requested format
//! 8. [`page`]      steps 5 to 7 for one page, folded into a `PageOutcome`

pub mod document;
pub mod encode;
pub mod inference;
pub mod metadata;
pub mod page;
pub mod parse;
pub mod render;
pub mod tool;
