use crate::store::{Flag, SessionStore};

/// Distance from the bottom edge still counted as "at the bottom"; absorbs sub-pixel rounding.
pub const FULLY_SCROLLED_TOLERANCE: f64 = 1.0;

/// Viewport geometry reported by the message list on every scroll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_height: f64,
    pub client_height: f64,
    pub scroll_top: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_height: f64, client_height: f64, scroll_top: f64) -> Self {
        Self {
            scroll_height,
            client_height,
            scroll_top,
        }
    }

    /// Remaining distance to the bottom edge.
    pub fn distance_to_bottom(&self) -> f64 {
        self.scroll_height - self.client_height - self.scroll_top
    }

    pub fn is_fully_scrolled(&self) -> bool {
        self.distance_to_bottom().abs() <= FULLY_SCROLLED_TOLERANCE
    }
}

/// Request for the view to move the list to its bottom edge.
///
/// `seq` grows with every request so the view can tell a new request from one it
/// already performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub seq: u64,
    pub smooth: bool,
}

/// Tracks the list's bottom edge and issues scroll requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollCoordinator {
    last_request: Option<ScrollRequest>,
    next_seq: u64,
}

impl ScrollCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the viewport position; the store only changes when the answer flips.
    pub fn on_scroll(&mut self, store: &mut SessionStore, metrics: ScrollMetrics) -> bool {
        store.set_flag(Flag::FullyScrolled, metrics.is_fully_scrolled())
    }

    /// Hidden while a reply is still streaming so the affordance does not flash.
    pub fn show_new_message_indicator(&self, store: &SessionStore) -> bool {
        !store.flag(Flag::FullyScrolled) && store.flag(Flag::StreamingDone)
    }

    /// User asked to jump to the newest message.
    pub fn scroll_to_bottom(&mut self, store: &mut SessionStore) -> ScrollRequest {
        store.set_flag(Flag::StreamingDone, false);
        self.request(true)
    }

    /// Keeps the tail in view when new content lands while the user was already there.
    pub fn follow_new_content(&mut self, store: &SessionStore) -> Option<ScrollRequest> {
        store
            .flag(Flag::FullyScrolled)
            .then(|| self.request(true))
    }

    /// Unconditional jump used when a session finishes loading.
    pub fn reveal_latest(&mut self) -> ScrollRequest {
        self.request(true)
    }

    /// The view reports the latest streamed reply finished rendering.
    pub fn mark_stream_rendered(&self, store: &mut SessionStore) {
        store.set_flag(Flag::Streaming, false);
        store.set_flag(Flag::StreamingDone, true);
    }

    pub fn last_request(&self) -> Option<ScrollRequest> {
        self.last_request
    }

    pub fn reset(&mut self) {
        // Keep the counter so requests issued after a reset are still recognized as new.
        self.last_request = None;
    }

    fn request(&mut self, smooth: bool) -> ScrollRequest {
        self.next_seq = self.next_seq.wrapping_add(1);
        let request = ScrollRequest {
            seq: self.next_seq,
            smooth,
        };
        self.last_request = Some(request);
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottom_edge_uses_one_unit_tolerance() {
        assert!(ScrollMetrics::new(500., 480., 20.).is_fully_scrolled());
        assert!(!ScrollMetrics::new(500., 480., 10.).is_fully_scrolled());
        assert!(ScrollMetrics::new(500., 480., 19.5).is_fully_scrolled());
        assert!(ScrollMetrics::new(500., 480., 20.8).is_fully_scrolled());
        assert!(!ScrollMetrics::new(500., 480., 18.).is_fully_scrolled());
    }

    #[test]
    fn on_scroll_only_reports_flips() {
        let mut store = SessionStore::new();
        let mut scroll = ScrollCoordinator::new();

        assert!(!scroll.on_scroll(&mut store, ScrollMetrics::new(500., 480., 20.)));
        assert!(scroll.on_scroll(&mut store, ScrollMetrics::new(500., 480., 10.)));
        assert!(!store.flag(Flag::FullyScrolled));
        assert!(!scroll.on_scroll(&mut store, ScrollMetrics::new(500., 480., 5.)));
    }

    #[test]
    fn indicator_requires_scrolled_up_and_finished_stream() {
        let mut store = SessionStore::new();
        let scroll = ScrollCoordinator::new();

        store.set_flag(Flag::FullyScrolled, false);
        assert!(!scroll.show_new_message_indicator(&store));

        store.set_flag(Flag::StreamingDone, true);
        assert!(scroll.show_new_message_indicator(&store));

        store.set_flag(Flag::FullyScrolled, true);
        assert!(!scroll.show_new_message_indicator(&store));
    }

    #[test]
    fn scroll_to_bottom_clears_stream_finished() {
        let mut store = SessionStore::new();
        let mut scroll = ScrollCoordinator::new();
        store.set_flag(Flag::FullyScrolled, false);
        scroll.mark_stream_rendered(&mut store);

        let first = scroll.scroll_to_bottom(&mut store);
        let second = scroll.scroll_to_bottom(&mut store);

        assert!(first.smooth);
        assert!(second.seq > first.seq);
        assert!(!store.flag(Flag::StreamingDone));
        assert!(!scroll.show_new_message_indicator(&store));
    }

    #[test]
    fn new_content_is_followed_only_from_the_bottom() {
        let mut store = SessionStore::new();
        let mut scroll = ScrollCoordinator::new();
        assert!(scroll.follow_new_content(&store).is_some());

        store.set_flag(Flag::FullyScrolled, false);
        scroll.reset();
        assert!(scroll.follow_new_content(&store).is_none());
        assert_eq!(scroll.last_request(), None);
    }
}
