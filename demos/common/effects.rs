use core::ops::Rem;

use palette::{Hsv, IntoColor, LinSrgb, Srgb};

pub fn rainbow(t: u32, pixels: &mut [LinSrgb<u8>]) {
    let t = (t as f32) / 500.;
    let count = pixels.len() as f32;

    for (pixel_pos, pixel_data) in pixels.iter_mut().enumerate() {
        let offset = (t + (pixel_pos as f32) / count).rem(1.0);

        let color: Srgb<f32> = Hsv::new_srgb(360.0 * offset, 1.0, 1.0).into_color();
        *pixel_data = color.into_linear().into_format();
    }
}

/// The colors the wipe cycles through.
pub const WIPE_COLORS: [[u8; 3]; 3] = [[255, 0, 0], [0, 255, 0], [0, 0, 255]];
