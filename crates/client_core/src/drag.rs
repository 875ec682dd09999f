//! Pointer-driven reordering of a vertical list of sections.
//!
//! The tracker only produces data: a [`DragPresentation`] for whatever draws
//! the list, and a [`DragOutcome`] that feeds
//! [`crate::DashboardSession::move_section`].

use shared::domain::SectionId;

/// Pointer travel, in pixels, before a press turns into a drag.
pub const DRAG_ACTIVATION_DISTANCE: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance_to(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// What to draw while a drag is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragPresentation {
    pub moved: SectionId,
    pub from_index: usize,
    /// Top-left of the floating copy of the dragged row.
    pub overlay: Point,
    /// Slot where the row would land if released now.
    pub placeholder_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    /// Released before the activation distance was reached.
    Click { index: usize },
    Reorder {
        moved: SectionId,
        from_index: usize,
        to_index: usize,
    },
    /// Dropped back where it started, or nothing was pressed.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Pressed {
        index: usize,
        origin: Point,
    },
    Dragging {
        index: usize,
        origin: Point,
        pointer: Point,
    },
}

#[derive(Debug, Clone)]
pub struct DragTracker {
    sequence: Vec<SectionId>,
    row_height: f32,
    list_top: f32,
    phase: Phase,
}

impl DragTracker {
    /// `sequence` is the rendered order; rows are `row_height` tall starting at
    /// `list_top`.
    pub fn new(sequence: Vec<SectionId>, row_height: f32, list_top: f32) -> Self {
        Self {
            sequence,
            row_height: row_height.max(1.0),
            list_top,
            phase: Phase::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging { .. })
    }

    /// Starts tracking a press on the row at `index`. Ignored if out of range.
    pub fn press(&mut self, index: usize, at: Point) {
        if index < self.sequence.len() {
            self.phase = Phase::Pressed { index, origin: at };
        }
    }

    pub fn move_to(&mut self, at: Point) -> Option<DragPresentation> {
        match self.phase {
            Phase::Idle => None,
            Phase::Pressed { index, origin } => {
                if origin.distance_to(at) < DRAG_ACTIVATION_DISTANCE {
                    return None;
                }
                self.phase = Phase::Dragging {
                    index,
                    origin,
                    pointer: at,
                };
                self.presentation()
            }
            Phase::Dragging { index, origin, .. } => {
                self.phase = Phase::Dragging {
                    index,
                    origin,
                    pointer: at,
                };
                self.presentation()
            }
        }
    }

    pub fn presentation(&self) -> Option<DragPresentation> {
        let Phase::Dragging {
            index,
            origin,
            pointer,
        } = self.phase
        else {
            return None;
        };
        let row_top = self.list_top + index as f32 * self.row_height;
        Some(DragPresentation {
            moved: self.sequence[index],
            from_index: index,
            overlay: Point::new(pointer.x - origin.x, row_top + pointer.y - origin.y),
            placeholder_index: self.slot_for(index, pointer.y - origin.y),
        })
    }

    pub fn release(&mut self, at: Point) -> DragOutcome {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        match phase {
            Phase::Idle => DragOutcome::Unchanged,
            Phase::Pressed { index, origin } => {
                if origin.distance_to(at) < DRAG_ACTIVATION_DISTANCE {
                    DragOutcome::Click { index }
                } else {
                    self.finish(index, at.y - origin.y)
                }
            }
            Phase::Dragging { index, origin, .. } => self.finish(index, at.y - origin.y),
        }
    }

    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }

    fn finish(&self, index: usize, dy: f32) -> DragOutcome {
        let to_index = self.slot_for(index, dy);
        if to_index == index {
            return DragOutcome::Unchanged;
        }
        DragOutcome::Reorder {
            moved: self.sequence[index],
            from_index: index,
            to_index,
        }
    }

    fn slot_for(&self, index: usize, dy: f32) -> usize {
        let last = self.sequence.len().saturating_sub(1) as f32;
        let shifted = (index as f32 + dy / self.row_height).round();
        shifted.clamp(0.0, last) as usize
    }
}

#[cfg(test)]
#[path = "tests/drag_tests.rs"]
mod tests;
