use std::cell::RefCell;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, RgbImage};
use log::debug;
use pdfium_render::prelude::*;

use crate::config::RasterOptions;
use crate::error::{Error, Result};
use crate::store::EncodedImage;

/// 存储页面图片时使用的 JPEG 质量
const JPEG_QUALITY: u8 = 85;

thread_local! {
    // pdfium 不是线程安全的，每个线程绑定一次动态库
    static PDFIUM: RefCell<Option<Pdfium>> = const { RefCell::new(None) };
}

/// 将 PDF 文档渲染为 RGB 图片
pub trait Rasterizer {
    /// 按页码顺序返回每一页的图片，失败时整个文档都视为失败
    fn rasterize(&self, path: &Path) -> Result<Vec<RgbImage>>;
}

/// 基于 pdfium 的光栅化实现
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
}

impl PdfiumRasterizer {
    pub fn new(opts: &RasterOptions) -> Self {
        Self { dpi: opts.dpi }
    }

    fn with_pdfium<T>(f: impl FnOnce(&Pdfium) -> Result<T>) -> Result<T> {
        PDFIUM.with(|cell| {
            let mut cell = cell.borrow_mut();
            let pdfium = match cell.take() {
                Some(pdfium) => pdfium,
                None => {
                    // 动态库缺失属于部署问题，不是单个文档的问题
                    let bindings = Pdfium::bind_to_system_library()
                        .map_err(|e| Error::Config(format!("无法加载 pdfium 动态库: {}", e)))?;
                    Pdfium::new(bindings)
                }
            };
            let result = f(&pdfium);
            *cell = Some(pdfium);
            result
        })
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, path: &Path) -> Result<Vec<RgbImage>> {
        // 72 DPI 为 PDF 标准分辨率
        let scale = self.dpi as f32 / 72.;
        Self::with_pdfium(|pdfium| {
            let document = pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| Error::Raster(format!("{}: {}", path.display(), e)))?;
            let config = PdfRenderConfig::new().scale_page_by_factor(scale);

            let mut images = vec![];
            for (i, page) in document.pages().iter().enumerate() {
                let bitmap = page
                    .render_with_config(&config)
                    .map_err(|e| Error::Raster(format!("第 {} 页渲染失败: {}", i + 1, e)))?;
                let width = bitmap.width() as u32;
                let height = bitmap.height() as u32;
                images.push(bgra_to_rgb(&bitmap.as_raw_bytes(), width, height)?);
            }
            debug!("{} 渲染完成，共 {} 页", path.display(), images.len());
            Ok(images)
        })
    }
}

/// pdfium 输出 BGRA 位图，丢弃 alpha 通道转为 RGB
fn bgra_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
    for pixel in data.chunks_exact(4) {
        rgb.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
    }
    ImageBuffer::from_raw(width, height, rgb)
        .ok_or_else(|| Error::Raster(format!("位图大小与 {}x{} 不符", width, height)))
}

/// 将页面编码为 JPEG，用于存储和发送给回答服务
pub fn encode_jpeg(image: &RgbImage) -> Result<EncodedImage> {
    let mut buf = Cursor::new(vec![]);
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(image)
        .map_err(|e| Error::Raster(format!("JPEG 编码失败: {}", e)))?;
    Ok(EncodedImage(buf.into_inner()))
}

/// 将页面编码为 PNG，用于发送给嵌入服务，避免有损压缩影响嵌入
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(vec![]);
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| Error::Raster(format!("PNG 编码失败: {}", e)))?;
    Ok(buf.into_inner())
}
