//! Drawing engine - append-only action log for shared vector surfaces.
//!
//! A session has two drawing surfaces backed by the same [`ActionLog`]
//! abstraction:
//!
//! - the *whiteboard*, authored by the host and broadcast to all
//! - the *annotation overlay*, drawn atop a live screen share and cleared
//!   when annotation mode exits
//!
//! The log is the sole source of truth for rendering: the visible surface is
//! always a pure function of the log. Actions are immutable once appended;
//! edits are expressed as new actions. Erasing is modeled as painting a path
//! in the background color, so the log stays strictly append-only - an
//! eraser stroke occludes earlier marks rather than removing them.

use std::collections::HashMap;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::model::{Color, Point};

/// Fixed length of each arrow-head segment, in surface units.
pub const ARROW_HEAD_LENGTH: f64 = 15.0;

/// Angular offset of each arrow-head segment from the shaft, in radians (30 degrees).
pub const ARROW_HEAD_ANGLE: f64 = std::f64::consts::PI / 6.0;

/// Opacity applied when rendering highlight strokes.
pub const HIGHLIGHT_OPACITY: f64 = 0.3;

/// Stroke width multiplier for highlight strokes, relative to the pen width.
pub const HIGHLIGHT_WIDTH_FACTOR: u32 = 4;

/// Variant-specific geometry of a drawing action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    /// Freehand stroke through an ordered list of points.
    Path { points: Vec<Point> },
    /// Axis-aligned rectangle between two corners.
    Rectangle { start: Point, end: Point },
    /// Circle centered on `start`; radius is the distance to `end`.
    Circle { start: Point, end: Point },
    /// Arrow shaft from `start` to `end` plus two head segments.
    Arrow { start: Point, end: Point },
    /// Text placed at an origin point.
    Text { origin: Point, content: String },
    /// Translucent wide stroke through an ordered list of points.
    Highlight { points: Vec<Point> },
}

/// One immutable drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawAction {
    /// Stroke or fill color.
    pub color: Color,
    /// Pen width. Highlights render at [`HIGHLIGHT_WIDTH_FACTOR`] times this.
    pub stroke_width: NonZeroU32,
    /// Geometry of the action.
    pub shape: Shape,
}

impl DrawAction {
    #[must_use]
    pub fn new(color: Color, stroke_width: NonZeroU32, shape: Shape) -> Self {
        Self {
            color,
            stroke_width,
            shape,
        }
    }

    /// An eraser stroke: a path painted in the background color.
    ///
    /// This occludes earlier marks instead of deleting them, keeping the log
    /// append-only. Flagged for product review: a true deletion would behave
    /// differently under zoom or over filled shapes.
    #[must_use]
    pub fn eraser(points: Vec<Point>, background: Color, stroke_width: NonZeroU32) -> Self {
        Self {
            color: background,
            stroke_width,
            shape: Shape::Path { points },
        }
    }

    /// Radius of a circle action, or `None` for other shapes.
    #[must_use]
    pub fn circle_radius(&self) -> Option<f64> {
        match &self.shape {
            Shape::Circle { start, end } => Some(start.distance_to(*end)),
            _ => None,
        }
    }

    /// Effective stroke width for rendering (highlights are widened).
    #[must_use]
    pub fn render_width(&self) -> u32 {
        match self.shape {
            Shape::Highlight { .. } => self.stroke_width.get() * HIGHLIGHT_WIDTH_FACTOR,
            _ => self.stroke_width.get(),
        }
    }

    /// Effective opacity for rendering.
    #[must_use]
    pub fn render_opacity(&self) -> f64 {
        match self.shape {
            Shape::Highlight { .. } => HIGHLIGHT_OPACITY,
            _ => 1.0,
        }
    }
}

/// Endpoints of the two arrow-head segments for a shaft from `start` to `end`.
///
/// Each segment starts at `end` and sweeps back toward the shaft at
/// [`ARROW_HEAD_ANGLE`] on either side, with length [`ARROW_HEAD_LENGTH`].
/// A zero-length shaft yields segments collapsed onto `end`.
#[must_use]
pub fn arrow_head_points(start: Point, end: Point) -> [Point; 2] {
    let angle = (end.y - start.y).atan2(end.x - start.x);
    let left = angle + std::f64::consts::PI - ARROW_HEAD_ANGLE;
    let right = angle + std::f64::consts::PI + ARROW_HEAD_ANGLE;

    [
        Point::new(
            end.x + ARROW_HEAD_LENGTH * left.cos(),
            end.y + ARROW_HEAD_LENGTH * left.sin(),
        ),
        Point::new(
            end.x + ARROW_HEAD_LENGTH * right.cos(),
            end.y + ARROW_HEAD_LENGTH * right.sin(),
        ),
    ]
}

/// Append-only log of drawing actions plus a redo buffer.
///
/// Invariant: the redo buffer is cleared whenever a new action is appended -
/// redo history does not survive new drawing.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    actions: Vec<DrawAction>,
    undone: Vec<DrawAction>,
}

impl ActionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action, discarding any redo history.
    ///
    /// This is the only mutation allowed to lose history.
    pub fn append(&mut self, action: DrawAction) {
        self.undone.clear();
        self.actions.push(action);
    }

    /// Undo the most recent action. No-op on an empty log.
    ///
    /// Returns whether an action was undone.
    pub fn undo(&mut self) -> bool {
        match self.actions.pop() {
            Some(action) => {
                self.undone.push(action);
                true
            }
            None => false,
        }
    }

    /// Redo the most recently undone action. No-op if the redo buffer is empty.
    ///
    /// Returns whether an action was restored.
    pub fn redo(&mut self) -> bool {
        match self.undone.pop() {
            Some(action) => {
                self.actions.push(action);
                true
            }
            None => false,
        }
    }

    /// Clear the log and the redo buffer.
    pub fn clear(&mut self) {
        self.actions.clear();
        self.undone.clear();
    }

    /// The ordered actions to paint, oldest first.
    #[must_use]
    pub fn render(&self) -> &[DrawAction] {
        &self.actions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Depth of the redo buffer.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.undone.len()
    }
}

/// Identifies one of the session's drawing surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceId {
    /// The shared whiteboard.
    Whiteboard,
    /// The screen-share annotation overlay (ephemeral).
    Annotation,
}

/// Drawing engine holding one action log per surface.
#[derive(Debug, Default)]
pub struct DrawingEngine {
    surfaces: HashMap<SurfaceId, ActionLog>,
}

impl DrawingEngine {
    #[must_use]
    pub fn new() -> Self {
        let mut surfaces = HashMap::new();
        surfaces.insert(SurfaceId::Whiteboard, ActionLog::new());
        surfaces.insert(SurfaceId::Annotation, ActionLog::new());
        Self { surfaces }
    }

    fn log_mut(&mut self, surface: SurfaceId) -> &mut ActionLog {
        self.surfaces.entry(surface).or_default()
    }

    /// Append an action to a surface.
    pub fn append(&mut self, surface: SurfaceId, action: DrawAction) {
        self.log_mut(surface).append(action);
    }

    /// Undo the latest action on a surface. Returns whether anything changed.
    pub fn undo(&mut self, surface: SurfaceId) -> bool {
        self.log_mut(surface).undo()
    }

    /// Redo the latest undone action on a surface. Returns whether anything changed.
    pub fn redo(&mut self, surface: SurfaceId) -> bool {
        self.log_mut(surface).redo()
    }

    /// Clear a surface.
    pub fn clear(&mut self, surface: SurfaceId) {
        self.log_mut(surface).clear();
    }

    /// The ordered actions for a surface, oldest first.
    #[must_use]
    pub fn render(&self, surface: SurfaceId) -> &[DrawAction] {
        match self.surfaces.get(&surface) {
            Some(log) => log.render(),
            None => &[],
        }
    }

    /// Leave annotation mode: the overlay is ephemeral and is wiped.
    pub fn exit_annotation(&mut self) {
        self.clear(SurfaceId::Annotation);
    }

    /// Snapshot a surface's log (for late joiners).
    #[must_use]
    pub fn snapshot(&self, surface: SurfaceId) -> ActionLog {
        self.surfaces.get(&surface).cloned().unwrap_or_default()
    }
}
