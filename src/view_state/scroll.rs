//! Scroll bounds and user scroll interception

use std::time::{Duration, Instant};

/// Valid scroll range for the current layout.
///
/// # Clamping Behavior
/// Scroll positions are clamped to `[0, max(0, total_height - viewport_height - end_padding)]`.
/// This ensures no blank viewports regardless of the requested position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollBounds {
    /// Total corrected content height.
    pub total_height: i64,
    /// Viewport height.
    pub viewport_height: i64,
    /// Slack subtracted from the bottom bound.
    pub end_padding: i64,
}

impl ScrollBounds {
    /// Create scroll bounds.
    pub fn new(total_height: i64, viewport_height: i64, end_padding: i64) -> Self {
        Self {
            total_height,
            viewport_height,
            end_padding,
        }
    }

    /// Largest valid scroll offset.
    pub fn max(&self) -> i64 {
        (self.total_height - self.viewport_height - self.end_padding).max(0)
    }

    /// Clamp an offset to the valid range.
    pub fn clamp(&self, scroll_top: i64) -> i64 {
        scroll_top.clamp(0, self.max())
    }
}

/// Result of intercepting one user scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollInput {
    /// Requested position was in range.
    Accepted(i64),
    /// Requested position was out of range and was clamped.
    Clamped(i64),
    /// Input arrived during the post-clamp momentum lock and was ignored.
    Locked(i64),
}

impl ScrollInput {
    /// Position the viewport ends up at.
    pub fn position(&self) -> i64 {
        match *self {
            ScrollInput::Accepted(top) | ScrollInput::Clamped(top) | ScrollInput::Locked(top) => top,
        }
    }
}

/// Re-clamps manual scroll input.
///
/// On touch devices, momentum scrolling keeps delivering events after the
/// content edge is hit; a short lock after each clamp swallows them so the
/// position does not oscillate.
#[derive(Debug, Clone)]
pub struct ScrollClamp {
    touch: bool,
    lock: Duration,
    locked_until: Option<Instant>,
}

impl ScrollClamp {
    /// Create a clamp. `lock` only applies when `touch` is set.
    pub fn new(touch: bool, lock: Duration) -> Self {
        Self {
            touch,
            lock,
            locked_until: None,
        }
    }

    /// Intercept a user scroll to `requested` while currently at `current`.
    pub fn intercept(
        &mut self,
        requested: i64,
        current: i64,
        bounds: &ScrollBounds,
        now: Instant,
    ) -> ScrollInput {
        if let Some(until) = self.locked_until {
            if now < until {
                return ScrollInput::Locked(bounds.clamp(current));
            }
            self.locked_until = None;
        }

        let clamped = bounds.clamp(requested);
        if clamped == requested {
            return ScrollInput::Accepted(clamped);
        }
        if self.touch {
            self.locked_until = Some(now + self.lock);
        }
        ScrollInput::Clamped(clamped)
    }

    /// True while momentum input is being suppressed.
    pub fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}
