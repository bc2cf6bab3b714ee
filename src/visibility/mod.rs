//! Widget and area visibility.
//!
//! Visibility is negotiated over the event bus with no central lock: widgets ask
//! for area changes, owners answer with facts, and the page-level manager pushes
//! container visibility down the widget tree.
//!
//! ## Contents
//! - [`VisibilityTopic`] encode/decode of the wire topics
//! - [`AreaRegistry`], [`AreaHelper`] area names and last known facts
//! - [`VisibilityCoordinator`] per-widget state machine (listeners, tracking, area requests)
//! - [`VisibilityEventManager`] page-level propagation
//!
//! ## Protocol
//! ```text
//! widget W ── changeAreaVisibilityRequest.W.a.true ──► manager
//! manager  ── changeAreaVisibilityRequest.W.a.<cv(W)> ──► W's responder
//! W        ── didChangeAreaVisibility.W.a.<resolved> ──► manager (records, cascades)
//!                                                     └─► widgets living in W.a
//! ```

mod area;
mod coordinator;
mod manager;
mod topics;

pub use area::{AreaHelper, AreaRegistry};
pub use coordinator::{
    AreaUpdateOptions, DEFAULT_TRACKING_PROPERTY, VisibilityCoordinator, VisibilityListener,
};
pub use manager::{MANAGER_NAME, VisibilityEventManager};
pub use topics::{
    AREA_CHANGED, AREA_REQUEST, AreaVisibility, VisibilityTopic, WIDGET_CHANGED, WIDGET_REQUEST,
    WIDGET_WILL_CHANGE, WidgetVisibility,
};
