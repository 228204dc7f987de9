use screen_translate_types::{Rect, TextBlock};

const VERTICAL_ASPECT: f32 = 0.4;
const LANE_OVERLAP: f32 = 0.3;
const MERGE_GAP_FACTOR: f32 = 1.5;

/// Reading order for vertical, right-to-left text.
///
/// Blocks at least 40% as tall as they are wide (or single characters) are
/// grouped into columns by horizontal overlap, columns run right to left, and
/// neighbours in a column are merged top to bottom. Remaining wide blocks
/// follow, sorted by their top edge.
pub fn order_vertical_columns(blocks: Vec<TextBlock>) -> Vec<TextBlock> {
    let (vertical, mut horizontal): (Vec<_>, Vec<_>) = blocks.into_iter().partition(|block| {
        block.bounds.height() >= block.bounds.width() * VERTICAL_ASPECT
            || block.text.chars().count() <= 1
    });

    let mut vertical = vertical;
    vertical.sort_by(|a, b| b.bounds.center_x().total_cmp(&a.bounds.center_x()));

    let mut lanes: Vec<Vec<TextBlock>> = Vec::new();
    for block in vertical {
        let mut best: Option<(usize, f32)> = None;
        for (index, lane) in lanes.iter().enumerate() {
            let ratio = lane_overlap(lane, &block.bounds);
            if ratio > best.map_or(0.0, |(_, r)| r) {
                best = Some((index, ratio));
            }
        }
        match best {
            Some((index, ratio)) if ratio > LANE_OVERLAP => lanes[index].push(block),
            _ => lanes.push(vec![block]),
        }
    }

    let mut ordered: Vec<TextBlock> = lanes.into_iter().flat_map(merge_lane).collect();
    horizontal.sort_by(|a, b| a.bounds.top.total_cmp(&b.bounds.top));
    ordered.extend(horizontal);
    ordered
}

fn lane_overlap(lane: &[TextBlock], bounds: &Rect) -> f32 {
    let left = lane
        .iter()
        .map(|b| b.bounds.left)
        .fold(f32::INFINITY, f32::min);
    let right = lane
        .iter()
        .map(|b| b.bounds.right)
        .fold(f32::NEG_INFINITY, f32::max);
    let overlap = bounds.right.min(right) - bounds.left.max(left);
    if overlap <= 0.0 {
        return 0.0;
    }
    let min_width = (right - left).min(bounds.width());
    if min_width > 0.0 {
        overlap / min_width
    } else {
        0.0
    }
}

fn merge_lane(mut lane: Vec<TextBlock>) -> Vec<TextBlock> {
    lane.sort_by(|a, b| a.bounds.top.total_cmp(&b.bounds.top));
    let mut merged = Vec::with_capacity(lane.len());
    let mut blocks = lane.into_iter();
    let Some(mut current) = blocks.next() else {
        return merged;
    };
    for next in blocks {
        let gap = next.bounds.top - current.bounds.bottom;
        let max_gap = current.bounds.width().max(next.bounds.width()) * MERGE_GAP_FACTOR;
        if gap < max_gap {
            current = TextBlock {
                text: current.text + &next.text,
                bounds: Rect::new(
                    current.bounds.left.min(next.bounds.left),
                    current.bounds.top,
                    current.bounds.right.max(next.bounds.right),
                    next.bounds.bottom,
                ),
            };
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(text: &str, x: f32, y: f32, w: f32, h: f32) -> TextBlock {
        TextBlock::new(text, Rect::from_xywh(x, y, w, h))
    }

    #[test]
    fn columns_read_right_to_left() {
        let blocks = vec![
            block("左", 10.0, 0.0, 20.0, 100.0),
            block("右", 200.0, 0.0, 20.0, 100.0),
            block("中", 100.0, 0.0, 20.0, 100.0),
        ];
        let texts: Vec<_> = order_vertical_columns(blocks)
            .into_iter()
            .map(|b| b.text)
            .collect();
        assert_eq!(texts, vec!["右", "中", "左"]);
    }

    #[test]
    fn close_blocks_in_a_column_merge() {
        let blocks = vec![
            block("下", 100.0, 120.0, 20.0, 100.0),
            block("上", 102.0, 0.0, 20.0, 100.0),
        ];
        let ordered = order_vertical_columns(blocks);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].text, "上下");
        assert_eq!(ordered[0].bounds, Rect::new(100.0, 0.0, 122.0, 220.0));
    }

    #[test]
    fn distant_blocks_in_a_column_stay_apart() {
        let blocks = vec![
            block("一", 100.0, 0.0, 20.0, 50.0),
            block("二", 100.0, 200.0, 20.0, 50.0),
        ];
        let ordered = order_vertical_columns(blocks);
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].text, "一");
    }

    #[test]
    fn wide_blocks_trail_sorted_by_top() {
        let blocks = vec![
            block("caption two", 0.0, 300.0, 200.0, 20.0),
            block("縦", 50.0, 0.0, 20.0, 100.0),
            block("caption one", 0.0, 250.0, 200.0, 20.0),
        ];
        let texts: Vec<_> = order_vertical_columns(blocks)
            .into_iter()
            .map(|b| b.text)
            .collect();
        assert_eq!(texts, vec!["縦", "caption one", "caption two"]);
    }
}
