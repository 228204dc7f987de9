use screen_translate_types::TextBlock;

/// Recognized blocks, in request-frame coordinates.
#[derive(Debug, Clone, Default)]
pub struct OcrResponse {
    pub blocks: Vec<TextBlock>,
}

impl OcrResponse {
    pub fn new(blocks: Vec<TextBlock>) -> Self {
        Self { blocks }
    }

    pub fn empty() -> Self {
        Self { blocks: Vec::new() }
    }

    pub fn is_blank(&self) -> bool {
        self.blocks.iter().all(|block| block.text.trim().is_empty())
    }

    /// Block texts joined one per line.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
