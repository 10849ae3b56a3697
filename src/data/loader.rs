use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use image::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

use super::model::{PixelDepth, Plane, Stack};
use crate::error::{LoadError, WriteError};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load an image file as a stack.  Dispatch by extension.
///
/// Supported formats:
/// * `.tif` / `.tiff` – single or multi-page grayscale TIFF (8, 16 or 32-bit float)
/// * anything else    – single-plane grayscale image decoded by the `image` crate
pub fn load_stack(path: &Path) -> Result<Stack, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "tif" | "tiff" => load_tiff(path),
        _ => load_single_plane(path),
    }
}

/// Write a stack as a multi-page TIFF, one page per slice, keeping its depth.
pub fn save_stack(stack: &Stack, path: &Path) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| WriteError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let file = File::create(path).map_err(|source| WriteError::CreateFile {
        path: path.to_path_buf(),
        source,
    })?;
    let tiff_err = |source| WriteError::Tiff {
        path: path.to_path_buf(),
        source,
    };

    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err)?;
    for plane in stack.planes() {
        let (w, h) = (plane.width() as u32, plane.height() as u32);
        match stack.depth() {
            PixelDepth::U8 => {
                let data: Vec<u8> = plane.pixels().iter().map(|&v| v as u8).collect();
                encoder
                    .write_image::<colortype::Gray8>(w, h, &data)
                    .map_err(tiff_err)?;
            }
            PixelDepth::U16 => {
                let data: Vec<u16> = plane.pixels().iter().map(|&v| v as u16).collect();
                encoder
                    .write_image::<colortype::Gray16>(w, h, &data)
                    .map_err(tiff_err)?;
            }
            PixelDepth::F32 => {
                encoder
                    .write_image::<colortype::Gray32Float>(w, h, plane.pixels())
                    .map_err(tiff_err)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TIFF loader
// ---------------------------------------------------------------------------

/// Every page becomes one slice, in file order. All pages must share the
/// first page's size and sample format.
fn load_tiff(path: &Path) -> Result<Stack, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let tiff_err = |source| LoadError::Tiff {
        path: path.to_path_buf(),
        source,
    };

    let malformed = |source| LoadError::Malformed {
        path: path.to_path_buf(),
        source,
    };

    let mut decoder = Decoder::new(BufReader::new(file)).map_err(tiff_err)?;
    let mut planes = Vec::new();
    let mut depth = None;
    let mut first_dims = None;

    loop {
        let (w, h) = decoder.dimensions().map_err(tiff_err)?;
        let (want_w, want_h) = *first_dims.get_or_insert((w, h));
        if (w, h) != (want_w, want_h) {
            return Err(LoadError::PageSize {
                path: path.to_path_buf(),
                page: planes.len(),
                got_w: w,
                got_h: h,
                want_w,
                want_h,
            });
        }

        match decoder.colortype().map_err(tiff_err)? {
            tiff::ColorType::Gray(_) => {}
            other => {
                return Err(LoadError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    format: format!("{other:?}"),
                })
            }
        }

        let (page_depth, pixels) = match decoder.read_image().map_err(tiff_err)? {
            DecodingResult::U8(buf) => (PixelDepth::U8, buf.into_iter().map(f32::from).collect()),
            DecodingResult::U16(buf) => (PixelDepth::U16, buf.into_iter().map(f32::from).collect()),
            DecodingResult::F32(buf) => (PixelDepth::F32, buf),
            other => {
                return Err(LoadError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    format: decoding_result_name(&other).to_string(),
                })
            }
        };

        if *depth.get_or_insert(page_depth) != page_depth {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: format!("mixed sample formats (page {})", planes.len()),
            });
        }

        planes.push(Plane::try_new(w as usize, h as usize, pixels).map_err(malformed)?);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(tiff_err)?;
    }

    let depth = depth.ok_or_else(|| LoadError::Empty {
        path: path.to_path_buf(),
    })?;
    assemble(path, depth, planes)
}

/// Build the stack, keeping the shape error that made it fail.
fn assemble(path: &Path, depth: PixelDepth, planes: Vec<Plane>) -> Result<Stack, LoadError> {
    Stack::new(depth, planes).map_err(|source| LoadError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn decoding_result_name(result: &DecodingResult) -> &'static str {
    match result {
        DecodingResult::U8(_) => "u8",
        DecodingResult::U16(_) => "u16",
        DecodingResult::U32(_) => "u32",
        DecodingResult::U64(_) => "u64",
        DecodingResult::I8(_) => "i8",
        DecodingResult::I16(_) => "i16",
        DecodingResult::I32(_) => "i32",
        DecodingResult::I64(_) => "i64",
        DecodingResult::F32(_) => "f32",
        DecodingResult::F64(_) => "f64",
    }
}

// ---------------------------------------------------------------------------
// Single-plane loader (PNG and friends)
// ---------------------------------------------------------------------------

fn load_single_plane(path: &Path) -> Result<Stack, LoadError> {
    let img = image::open(path).map_err(|source| LoadError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let (w, h) = (img.width() as usize, img.height() as usize);

    let (depth, pixels): (PixelDepth, Vec<f32>) = match img.color() {
        ColorType::L8 | ColorType::La8 => (
            PixelDepth::U8,
            img.to_luma8().into_raw().into_iter().map(f32::from).collect(),
        ),
        ColorType::L16 | ColorType::La16 => (
            PixelDepth::U16,
            img.to_luma16().into_raw().into_iter().map(f32::from).collect(),
        ),
        other => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: format!("{other:?}"),
            })
        }
    };

    if pixels.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let malformed = |source| LoadError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let plane = Plane::try_new(w, h, pixels).map_err(malformed)?;
    assemble(path, depth, vec![plane])
}
