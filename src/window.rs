use std::ops::Range;

/// Slice of a list to show around `cursor`, keeping `margin` rows on each
/// side where the list allows it. The returned range is half-open.
///
/// Callers must not pass an empty list.
pub fn scroll_window(cursor: usize, len: usize, margin: usize) -> Range<usize> {
    debug_assert!(len > 0, "scroll_window on empty list");
    let last = len.saturating_sub(1);
    let cursor = cursor.min(last);
    let span = margin.saturating_mul(2);
    let (start, end) = if cursor <= margin {
        (0, last.min(span))
    } else if last - cursor <= margin {
        (last.saturating_sub(span), last)
    } else {
        (cursor - margin, cursor + margin)
    };
    start..end + 1
}

/// `scroll_window` adjusted for the viewport: on odd heights one row is
/// dropped from the top once the cursor has moved past the margin, so the
/// last row never falls off the pane.
pub fn fit_window(cursor: usize, len: usize, margin: usize, height: u16) -> Range<usize> {
    if len == 0 {
        return 0..0;
    }
    let mut range = scroll_window(cursor, len, margin);
    if height % 2 == 1 && cursor > margin && range.start < cursor {
        range.start += 1;
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_margin_slides_with_cursor() {
        let expected = [
            (0, 0..5),
            (1, 0..5),
            (2, 0..5),
            (3, 1..6),
            (4, 2..7),
            (5, 3..8),
            (6, 4..9),
            (7, 5..10),
            (8, 5..10),
            (9, 5..10),
        ];
        for (cursor, range) in expected {
            assert_eq!(scroll_window(cursor, 10, 2), range, "cursor {cursor}");
        }
    }

    #[test]
    fn margin_larger_than_list_shows_everything() {
        assert_eq!(scroll_window(0, 10, 15), 0..10);
        assert_eq!(scroll_window(9, 10, 15), 0..10);
    }

    #[test]
    fn single_element_list() {
        assert_eq!(scroll_window(0, 1, 0), 0..1);
        assert_eq!(scroll_window(0, 1, 4), 0..1);
    }

    #[test]
    fn window_bounds_hold_for_all_inputs() {
        for len in 1..30usize {
            for margin in 0..12usize {
                for cursor in 0..len {
                    let range = scroll_window(cursor, len, margin);
                    assert!(range.start <= cursor && cursor < range.end);
                    assert!(range.end <= len);
                    assert!(range.len() <= len.min(2 * margin + 1));
                }
            }
        }
    }

    #[test]
    fn odd_height_drops_first_row_past_margin() {
        assert_eq!(fit_window(5, 10, 2, 11), 4..8);
        assert_eq!(fit_window(5, 10, 2, 10), 3..8);
        assert_eq!(fit_window(1, 10, 2, 11), 0..5);
        assert_eq!(fit_window(0, 0, 2, 11), 0..0);
    }

    #[test]
    fn odd_height_keeps_cursor_visible() {
        for len in 1..20usize {
            for cursor in 0..len {
                let range = fit_window(cursor, len, 0, 7);
                assert!(range.contains(&cursor), "len {len} cursor {cursor}");
            }
        }
    }
}
