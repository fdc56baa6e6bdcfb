// src/frame/animation.rs

/// Step applied to both line coordinates per produced frame.
pub const LINE_STEP: u32 = 2;

/// Position of the moving highlight line. Owned by the producer only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnimationState {
    pub line_x: u32,
    pub line_y: u32,
}

impl AnimationState {
    /// Moves the line by `LINE_STEP` in both directions, wrapping at the
    /// visible frame size.
    pub fn advance(&mut self, width: u32, height: u32) {
        self.line_x = (self.line_x + LINE_STEP) % width;
        self.line_y = (self.line_y + LINE_STEP) % height;
    }
}
