//! Real page rasters through the system pdfium library
//!
//! Metadata, text and widgets still come from [`LopdfRenderer`]; pdfium only
//! produces pixels.

use std::collections::HashMap;

use folio_scheduler::CancellationToken;
use pdfium_render::prelude::*;

use crate::error::{EngineError, EngineResult};
use crate::geometry::{PageSize, PageViewport, Rotation};
use crate::renderer::{
    DocumentHandle, LopdfRenderer, Renderer, RgbaImage, TextItem, WidgetAnnotation,
};

pub struct PdfiumRenderer {
    pdfium: Pdfium,
    inner: LopdfRenderer,
    sources: HashMap<DocumentHandle, Vec<u8>>,
}

fn backend(err: PdfiumError) -> EngineError {
    EngineError::Backend(format!("pdfium: {err}"))
}

impl PdfiumRenderer {
    pub fn from_system_library() -> EngineResult<Self> {
        let bindings = Pdfium::bind_to_system_library().map_err(|err| {
            EngineError::Backend(format!("failed to bind pdfium system library: {err}"))
        })?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
            inner: LopdfRenderer::new(),
            sources: HashMap::new(),
        })
    }
}

impl Renderer for PdfiumRenderer {
    fn load_document(&mut self, bytes: &[u8]) -> EngineResult<DocumentHandle> {
        let handle = self.inner.load_document(bytes)?;
        self.sources.insert(handle, bytes.to_vec());
        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> EngineResult<u32> {
        self.inner.page_count(handle)
    }

    fn page_size(&self, handle: DocumentHandle, page: u32) -> EngineResult<PageSize> {
        self.inner.page_size(handle, page)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        page: u32,
        viewport: &PageViewport,
        token: &CancellationToken,
    ) -> EngineResult<RgbaImage> {
        let bytes = self
            .sources
            .get(&handle)
            .ok_or(EngineError::InvalidHandle(handle.raw()))?;
        let page_count = self.inner.page_count(handle)?;
        let index = page
            .checked_sub(1)
            .filter(|index| *index < page_count)
            .and_then(|index| u16::try_from(index).ok())
            .ok_or(EngineError::PageOutOfRange { page, page_count })?;
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(backend)?;
        let pdf_page = document.pages().get(index).map_err(backend)?;

        let rotation = match viewport.rotation {
            Rotation::Deg0 => PdfPageRenderRotation::None,
            Rotation::Deg90 => PdfPageRenderRotation::Degrees90,
            Rotation::Deg180 => PdfPageRenderRotation::Degrees180,
            Rotation::Deg270 => PdfPageRenderRotation::Degrees270,
        };
        let (width, height) = viewport.pixel_size();
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32)
            .rotate(rotation, true);

        let bitmap = pdf_page.render_with_config(&config).map_err(backend)?;
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
        RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
            .ok_or_else(|| EngineError::Backend("pdfium returned a short bitmap".to_owned()))
    }

    fn text_content(&self, handle: DocumentHandle, page: u32) -> EngineResult<Vec<TextItem>> {
        self.inner.text_content(handle, page)
    }

    fn annotations(
        &self,
        handle: DocumentHandle,
        page: u32,
    ) -> EngineResult<Vec<WidgetAnnotation>> {
        self.inner.annotations(handle, page)
    }

    fn close(&mut self, handle: DocumentHandle) -> EngineResult<()> {
        self.sources.remove(&handle);
        self.inner.close(handle)
    }
}
