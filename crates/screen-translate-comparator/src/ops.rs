use rayon::prelude::*;
use screen_translate_types::Frame;

/// Area-average downsample of a single-channel plane.
pub fn resize_average(
    pixels: &[f32],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Vec<f32> {
    let mut output = vec![0.0f32; new_width * new_height];
    if width == 0 || height == 0 || new_width == 0 || new_height == 0 {
        return output;
    }
    if pixels.len() < width * height {
        return output;
    }
    let scale_x = width as f32 / new_width as f32;
    let scale_y = height as f32 / new_height as f32;
    output
        .par_chunks_mut(new_width)
        .enumerate()
        .for_each(|(ny, row)| {
            let src_y0 = ((ny as f32 * scale_y).floor() as usize).min(height - 1);
            let src_y1 = (((ny + 1) as f32 * scale_y).ceil() as usize).clamp(src_y0 + 1, height);
            for (nx, out) in row.iter_mut().enumerate() {
                let src_x0 = ((nx as f32 * scale_x).floor() as usize).min(width - 1);
                let src_x1 =
                    (((nx + 1) as f32 * scale_x).ceil() as usize).clamp(src_x0 + 1, width);
                let mut sum = 0.0f32;
                let mut count = 0usize;
                for sy in src_y0..src_y1 {
                    let base = sy * width;
                    for sx in src_x0..src_x1 {
                        sum += pixels[base + sx];
                        count += 1;
                    }
                }
                *out = if count == 0 { 0.0 } else { sum / count as f32 };
            }
        });
    output
}

/// Downsamples the frame to `side`x`side` grayscale samples.
pub fn luma_grid(frame: &Frame, side: usize) -> Vec<u8> {
    let luma = frame.luma();
    resize_average(
        &luma,
        frame.width() as usize,
        frame.height() as usize,
        side,
        side,
    )
    .into_iter()
    .map(|value| value.round().clamp(0.0, 255.0) as u8)
    .collect()
}
