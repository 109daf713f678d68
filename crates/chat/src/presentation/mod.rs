/// Mutually exclusive auxiliary panels.
pub mod panels;
/// Bottom-edge tracking and scroll requests for the message list.
pub mod scroll;
/// Render-ready projection of store and presentation state.
pub mod view_model;

pub use panels::{Panel, PanelState};
pub use scroll::{FULLY_SCROLLED_TOLERANCE, ScrollCoordinator, ScrollMetrics, ScrollRequest};
pub use view_model::{ChatViewModel, SuggestedPrompts, project};
