use crate::foundation::core::{Rect, Size, Vec2};
use crate::property::tree::{NodeId, NodeState};

/// Handle to a scroll node.
pub type ScrollId = NodeId<ScrollState>;

#[derive(Clone, Debug, Default, PartialEq)]
/// Scroll container geometry. The scroll offset itself lives on the paired transform node.
pub struct ScrollState {
    pub container_rect: Rect,
    pub contents_size: Size,
    pub user_scrollable_horizontal: bool,
    pub user_scrollable_vertical: bool,
}

impl ScrollState {
    pub fn new(container_rect: Rect, contents_size: Size) -> Self {
        Self {
            container_rect,
            contents_size,
            user_scrollable_horizontal: true,
            user_scrollable_vertical: true,
        }
    }

    /// Largest offset the container can scroll to, per axis.
    pub fn max_scroll_offset(&self) -> Vec2 {
        Vec2::new(
            (self.contents_size.width - self.container_rect.width()).max(0.0),
            (self.contents_size.height - self.container_rect.height()).max(0.0),
        )
    }
}

impl NodeState for ScrollState {
    type GeometryCache = ();
}
