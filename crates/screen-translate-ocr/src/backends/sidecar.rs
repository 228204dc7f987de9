//! Reads recognized lines from text files stored next to replayed frames.
//!
//! For frame `N` the engine reads `<stem>.txt` beside the `N`th image. Each
//! non-empty line is one block. A line may start with `@x,y,w,h ` to give its
//! bounds in full-frame pixels; otherwise lines are stacked as full-width bands.

use std::fs;
use std::path::PathBuf;

use screen_translate_types::{Rect, TextBlock};
use tracing::debug;

use crate::engine::OcrEngine;
use crate::error::OcrError;
use crate::request::OcrRequest;
use crate::response::OcrResponse;

#[derive(Debug, Clone)]
pub struct SidecarOcrEngine {
    frames: Vec<PathBuf>,
}

impl SidecarOcrEngine {
    pub fn new(frames: Vec<PathBuf>) -> Self {
        Self { frames }
    }
}

impl OcrEngine for SidecarOcrEngine {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        let frame = request.frame();
        let Some(image) = frame
            .frame_index()
            .and_then(|index| self.frames.get(index as usize))
        else {
            return Ok(OcrResponse::empty());
        };
        let path = image.with_extension("txt");
        if !path.exists() {
            debug!(path = %path.display(), "no sidecar text for frame");
            return Ok(OcrResponse::empty());
        }
        let contents = fs::read_to_string(&path)?;
        let lines: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let (origin_x, origin_y) = request.origin();
        let (width, height) = (frame.width() as f32, frame.height() as f32);
        let band = height / lines.len().max(1) as f32;
        let blocks = lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| match parse_bounds(line) {
                Some((bounds, text)) => Some(TextBlock::new(
                    text,
                    bounds.offset(-(origin_x as f32), -(origin_y as f32)),
                )),
                None if line.starts_with('@') => None,
                None => Some(TextBlock::new(
                    *line,
                    Rect::new(0.0, band * index as f32, width, band * (index + 1) as f32),
                )),
            })
            .collect();
        Ok(OcrResponse::new(blocks))
    }
}

fn parse_bounds(line: &str) -> Option<(Rect, &str)> {
    let rest = line.strip_prefix('@')?;
    let (spec, text) = rest.split_once(char::is_whitespace)?;
    let values: Vec<f32> = spec
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .ok()?;
    let [x, y, w, h] = values.as_slice() else {
        return None;
    };
    Some((Rect::from_xywh(*x, *y, *w, *h), text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use screen_translate_types::Frame;

    fn frame(index: u64, width: u32, height: u32) -> Frame {
        Frame::from_rgba(width, height, vec![0; (width * height * 4) as usize])
            .unwrap()
            .with_frame_index(Some(index))
    }

    #[test]
    fn plain_lines_become_stacked_bands() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("000.png");
        fs::write(dir.path().join("000.txt"), "first\n\n second \n").unwrap();
        let engine = SidecarOcrEngine::new(vec![image]);
        let frame = frame(0, 100, 40);
        let response = engine.recognize(&OcrRequest::new(&frame)).unwrap();
        assert_eq!(response.text(), "first\nsecond");
        assert_eq!(response.blocks[1].bounds, Rect::new(0.0, 20.0, 100.0, 40.0));
    }

    #[test]
    fn explicit_bounds_are_shifted_into_the_crop() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        fs::write(dir.path().join("a.txt"), "@50,60,10,5 hello world\n").unwrap();
        let engine = SidecarOcrEngine::new(vec![image]);
        let frame = frame(0, 40, 40);
        let response = engine
            .recognize(&OcrRequest::new(&frame).with_origin(40, 50))
            .unwrap();
        assert_eq!(response.blocks.len(), 1);
        assert_eq!(response.blocks[0].text, "hello world");
        assert_eq!(response.blocks[0].bounds, Rect::new(10.0, 10.0, 20.0, 15.0));
    }

    #[test]
    fn unknown_frames_are_empty() {
        let engine = SidecarOcrEngine::new(Vec::new());
        let frame = frame(3, 4, 4);
        assert!(engine.recognize(&OcrRequest::new(&frame)).unwrap().is_blank());
    }
}
