//! Wire topics of the visibility protocol.
//!
//! ```text
//! changeAreaVisibilityRequest.<fullArea>.<true|false>     payload {area, visible}
//! didChangeAreaVisibility.<fullArea>.<true|false>         payload {area, visible}
//! changeWidgetVisibilityRequest.<widgetId>.<true|false>   payload {widget, visible}
//! ```
//!
//! Every topic is built and parsed through [`VisibilityTopic`]; nothing else in
//! the crate formats these strings by hand.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request asking the owner of an area to (re)compute its visibility.
pub const AREA_REQUEST: &str = "changeAreaVisibilityRequest";
/// Fact announcing the resolved visibility of an area.
pub const AREA_CHANGED: &str = "didChangeAreaVisibility";
/// Request to show or hide a whole widget, overriding its container.
pub const WIDGET_REQUEST: &str = "changeWidgetVisibilityRequest";
/// Announcement that a widget visibility request will be answered.
pub const WIDGET_WILL_CHANGE: &str = "willChangeWidgetVisibility";
/// Answer to a widget visibility request.
pub const WIDGET_CHANGED: &str = "didChangeWidgetVisibility";

/// Payload of area requests and area facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaVisibility {
    /// Full area name (`<widgetId>.<localArea>` or a page area).
    pub area: String,
    /// Requested, proposed or resolved visibility, depending on the topic.
    pub visible: bool,
}

/// Payload of widget requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetVisibility {
    /// Widget id.
    pub widget: String,
    /// Requested visibility.
    pub visible: bool,
}

/// One visibility topic, decoded.
///
/// # Example
/// ```rust
/// use widgetry::visibility::VisibilityTopic;
///
/// let topic = VisibilityTopic::AreaChanged { area: "w1.content".into(), visible: true };
/// assert_eq!(topic.to_string(), "didChangeAreaVisibility.w1.content.true");
/// assert_eq!(VisibilityTopic::decode("didChangeAreaVisibility.w1.content.true"), Some(topic));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityTopic {
    /// `changeAreaVisibilityRequest.<area>.<visible>`
    AreaRequest { area: String, visible: bool },
    /// `didChangeAreaVisibility.<area>.<visible>`
    AreaChanged { area: String, visible: bool },
    /// `changeWidgetVisibilityRequest.<widget>.<visible>`
    WidgetRequest { widget: String, visible: bool },
}

impl VisibilityTopic {
    /// Formats the topic string.
    pub fn encode(&self) -> String {
        format!("{}.{}.{}", self.prefix(), self.subject(), self.visible())
    }

    /// Parses a topic; `None` for foreign topics, empty subjects or non-boolean flags.
    pub fn decode(topic: &str) -> Option<Self> {
        let (prefix, rest) = topic.split_once('.')?;
        let (subject, flag) = rest.rsplit_once('.')?;
        if subject.is_empty() {
            return None;
        }
        let visible = match flag {
            "true" => true,
            "false" => false,
            _ => return None,
        };
        let subject = subject.to_string();
        match prefix {
            AREA_REQUEST => Some(Self::AreaRequest {
                area: subject,
                visible,
            }),
            AREA_CHANGED => Some(Self::AreaChanged {
                area: subject,
                visible,
            }),
            WIDGET_REQUEST => Some(Self::WidgetRequest {
                widget: subject,
                visible,
            }),
            _ => None,
        }
    }

    /// Event payload carried with this topic.
    pub fn payload(&self) -> Value {
        let value = match self {
            Self::AreaRequest { area, visible } | Self::AreaChanged { area, visible } => {
                serde_json::to_value(AreaVisibility {
                    area: area.clone(),
                    visible: *visible,
                })
            }
            Self::WidgetRequest { widget, visible } => serde_json::to_value(WidgetVisibility {
                widget: widget.clone(),
                visible: *visible,
            }),
        };
        value.unwrap_or(Value::Null)
    }

    /// Area or widget id the topic is about.
    pub fn subject(&self) -> &str {
        match self {
            Self::AreaRequest { area, .. } | Self::AreaChanged { area, .. } => area,
            Self::WidgetRequest { widget, .. } => widget,
        }
    }

    /// Boolean flag at the end of the topic.
    pub fn visible(&self) -> bool {
        match self {
            Self::AreaRequest { visible, .. }
            | Self::AreaChanged { visible, .. }
            | Self::WidgetRequest { visible, .. } => *visible,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Self::AreaRequest { .. } => AREA_REQUEST,
            Self::AreaChanged { .. } => AREA_CHANGED,
            Self::WidgetRequest { .. } => WIDGET_REQUEST,
        }
    }
}

impl fmt::Display for VisibilityTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// `willChangeWidgetVisibility.<widget>.<visible>` / `didChangeWidgetVisibility.<widget>.<visible>`.
pub(crate) fn widget_reply_topics(widget: &str, visible: bool) -> (String, String) {
    (
        format!("{WIDGET_WILL_CHANGE}.{widget}.{visible}"),
        format!("{WIDGET_CHANGED}.{widget}.{visible}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::reply_topics;

    #[test]
    fn test_area_names_may_contain_dots() {
        let topic = VisibilityTopic::decode("changeAreaVisibilityRequest.w1.nested.area.false").unwrap();
        assert_eq!(
            topic,
            VisibilityTopic::AreaRequest {
                area: "w1.nested.area".into(),
                visible: false
            }
        );
        assert_eq!(topic.encode(), "changeAreaVisibilityRequest.w1.nested.area.false");
    }

    #[test]
    fn test_rejects_foreign_or_malformed_topics() {
        assert_eq!(VisibilityTopic::decode("didSave.doc.true"), None);
        assert_eq!(VisibilityTopic::decode("didChangeAreaVisibility.content.maybe"), None);
        assert_eq!(VisibilityTopic::decode("didChangeAreaVisibility.true"), None);
        assert_eq!(VisibilityTopic::decode("didChangeAreaVisibility"), None);
    }

    #[test]
    fn test_payload_shapes() {
        let area = VisibilityTopic::AreaChanged {
            area: "page".into(),
            visible: true,
        };
        assert_eq!(area.payload(), serde_json::json!({ "area": "page", "visible": true }));

        let widget = VisibilityTopic::WidgetRequest {
            widget: "w1".into(),
            visible: false,
        };
        let parsed: WidgetVisibility = serde_json::from_value(widget.payload()).unwrap();
        assert_eq!(parsed.widget, "w1");
        assert!(!parsed.visible);
    }

    #[test]
    fn test_widget_reply_topics_follow_request_derivation() {
        let request = VisibilityTopic::WidgetRequest {
            widget: "popup".into(),
            visible: true,
        };
        let derived = reply_topics(&request.encode());
        assert_eq!(widget_reply_topics("popup", true), derived);
    }
}
