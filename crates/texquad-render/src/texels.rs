// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;
use texquad_core::Error;

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Clone, Debug)]
pub struct Texels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Texels {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let img = image::open(path)
            .map_err(|e| Error::TextureLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .into_rgba8();
        let (width, height) = img.dimensions();
        tracing::info!("texture {} ({}x{})", path.display(), width, height);
        Ok(Self {
            width,
            height,
            rgba: img.into_raw(),
        })
    }

    /// Square black/white checkerboard with `cell`-pixel squares.
    pub fn checkerboard(size: u32, cell: u32) -> Self {
        let cell = cell.max(1);
        let mut rgba = Vec::with_capacity(Self::rgba_len(size, size));
        for y in 0..size {
            for x in 0..size {
                let v = if ((x / cell) + (y / cell)) % 2 == 0 { 0xff } else { 0x20 };
                rgba.extend_from_slice(&[v, v, v, 0xff]);
            }
        }
        Self {
            width: size,
            height: size,
            rgba,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.rgba.len()
    }

    /// Bytes needed for `width` x `height` RGBA8, computed without `u32` overflow.
    pub fn rgba_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(t: &Texels, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * t.width + x) * 4) as usize;
        [t.rgba[i], t.rgba[i + 1], t.rgba[i + 2], t.rgba[i + 3]]
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let t = Texels::checkerboard(8, 2);
        assert_eq!(t.byte_len(), 8 * 8 * 4);
        assert_eq!(px(&t, 0, 0), [0xff, 0xff, 0xff, 0xff]);
        assert_eq!(px(&t, 1, 1), [0xff, 0xff, 0xff, 0xff]);
        assert_eq!(px(&t, 2, 0), [0x20, 0x20, 0x20, 0xff]);
        assert_eq!(px(&t, 0, 2), [0x20, 0x20, 0x20, 0xff]);
        assert_eq!(px(&t, 2, 2), [0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn large_sizes_do_not_overflow_u32() {
        assert_eq!(Texels::rgba_len(8, 8), 256);
        assert_eq!(Texels::rgba_len(32768, 32768), 32768 * 32768 * 4);
        assert_eq!(Texels::rgba_len(u32::MAX, 1), u32::MAX as usize * 4);
    }

    #[test]
    fn zero_cell_does_not_divide_by_zero() {
        let t = Texels::checkerboard(2, 0);
        assert_eq!(px(&t, 0, 0)[0], 0xff);
        assert_eq!(px(&t, 1, 0)[0], 0x20);
    }

    #[test]
    fn missing_file_is_a_texture_error() {
        let err = Texels::load(Path::new("no/such/texture.png")).unwrap_err();
        assert!(matches!(err, Error::TextureLoad { .. }));
        assert!(err.to_string().contains("no/such/texture.png"));
    }

    #[test]
    fn decodes_a_written_png() {
        let dir = std::env::temp_dir().join(format!("texquad-texels-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tiny.png");
        let img = image::RgbaImage::from_raw(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 128]).unwrap();
        img.save(&path).unwrap();

        let t = Texels::load(&path).unwrap();
        assert_eq!((t.width, t.height), (2, 1));
        assert_eq!(t.rgba, vec![255, 0, 0, 255, 0, 0, 255, 128]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
