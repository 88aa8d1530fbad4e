//! Drawable elements and the stroke-fragment merge rule.
//!
//! DESIGN
//! ======
//! Elements are a tagged union keyed by `type`, with the camelCase field
//! names the browser client produces. Only strokes are mutable: a stroke
//! fragment either creates a stroke or extends the points of an existing
//! one. Every other kind is immutable once inserted.

use serde::{Deserialize, Serialize};

// =============================================================================
// ELEMENTS
// =============================================================================

/// One drawable object in a room. Insertion order is render order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Stroke(Stroke),
    Rect(Rect),
    Circle(Circle),
    Line(Line),
    Text(Text),
}

impl Element {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Stroke(s) => &s.id,
            Self::Rect(r) => &r.id,
            Self::Circle(c) => &c.id,
            Self::Line(l) => &l.id,
            Self::Text(t) => &t.id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stroke(_) => "stroke",
            Self::Rect(_) => "rect",
            Self::Circle(_) => "circle",
            Self::Line(_) => "line",
            Self::Text(_) => "text",
        }
    }
}

/// Freehand path. `points` is flattened `[x1, y1, x2, y2, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: String,
    pub color: String,
    pub width: f64,
    #[serde(default)]
    pub points: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub stroke_color: String,
    pub stroke_width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub stroke_color: String,
    pub stroke_width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub stroke_color: String,
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Text {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: String,
    pub font_size: f64,
}

// =============================================================================
// STROKE FRAGMENTS
// =============================================================================

/// An incremental batch of points for an in-progress stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeFragment {
    pub id: String,
    pub color: String,
    pub width: f64,
    #[serde(default)]
    pub points: Vec<f64>,
}

impl From<StrokeFragment> for Stroke {
    fn from(fragment: StrokeFragment) -> Self {
        Self { id: fragment.id, color: fragment.color, width: fragment.width, points: fragment.points }
    }
}

/// Merge a fragment into an element list.
///
/// Appends the fragment's points to the stroke with the same id and takes
/// the fragment's color/width, or pushes a new stroke when no element has
/// that id. Returns `true` when an existing stroke was extended.
pub fn merge_stroke(elements: &mut Vec<Element>, fragment: StrokeFragment) -> bool {
    let existing = elements.iter_mut().find(|el| el.id() == fragment.id);
    match existing {
        Some(Element::Stroke(stroke)) => {
            stroke.points.extend_from_slice(&fragment.points);
            stroke.color = fragment.color;
            stroke.width = fragment.width;
            true
        }
        Some(other) => {
            // EDGE: a non-stroke with this id has no points to extend. The
            // fragment takes its slot so render order is kept.
            *other = Element::Stroke(fragment.into());
            true
        }
        None => {
            elements.push(Element::Stroke(fragment.into()));
            false
        }
    }
}

#[cfg(test)]
#[path = "element_test.rs"]
mod tests;
