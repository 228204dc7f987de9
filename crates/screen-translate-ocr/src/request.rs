use screen_translate_types::Frame;

/// OCR invocation metadata.
#[derive(Debug)]
pub struct OcrRequest<'a> {
    frame: &'a Frame,
    language: Option<&'a str>,
    origin: (u32, u32),
}

impl<'a> OcrRequest<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Self {
            frame,
            language: None,
            origin: (0, 0),
        }
    }

    /// Source-language hint; `None` lets the engine detect the script.
    pub fn with_language(mut self, language: Option<&'a str>) -> Self {
        self.language = language;
        self
    }

    /// Position of `frame` inside the full capture when it is a crop.
    pub fn with_origin(mut self, x: u32, y: u32) -> Self {
        self.origin = (x, y);
        self
    }

    pub fn frame(&self) -> &'a Frame {
        self.frame
    }

    pub fn language(&self) -> Option<&'a str> {
        self.language
    }

    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }
}
