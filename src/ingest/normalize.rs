use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

/// Convert a packed device buffer to interleaved RGB24.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    match format {
        PixelFormat::Rgb24 => {
            expect_len("RGB", pixels, plane * 3)?;
            Ok(pixels.to_vec())
        }
        PixelFormat::Yuyv => {
            expect_even("YUYV", width, 1)?;
            expect_len("YUYV", pixels, plane * 2)?;
            Ok(yuyv_to_rgb(pixels, plane))
        }
        PixelFormat::Nv12 => {
            expect_even("NV12", width, height)?;
            expect_len("NV12", pixels, plane + plane / 2)?;
            Ok(nv12_to_rgb(pixels, w, h))
        }
    }
}

// Chroma is shared by 2x1 (YUYV) or 2x2 (NV12) pixel blocks.
fn expect_even(kind: &str, width: u32, height: u32) -> Result<()> {
    if width % 2 != 0 || height % 2 != 0 {
        return Err(anyhow!(
            "{} frame dimensions must be even, got {}x{}",
            kind,
            width,
            height
        ));
    }
    Ok(())
}

fn expect_len(kind: &str, pixels: &[u8], expected: usize) -> Result<()> {
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            kind,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

// Y0 U Y1 V covers two horizontally adjacent pixels.
fn yuyv_to_rgb(pixels: &[u8], plane: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(plane * 3);
    for quad in pixels.chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            rgb.extend_from_slice(&yuv_to_rgb(y as f32, u, v));
        }
    }
    rgb
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;
            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&yuv_to_rgb(y, u, v));
        }
    }
    rgb
}

fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b)]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
