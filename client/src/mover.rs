//! Synthetic local movement for headless clients.
//!
//! Without an input device the client still needs something to report, so
//! the mover patrols horizontally across the world and reverses whenever a
//! step would leave the bounds.

use shared::{Rect, PLAYER_SIZE, WORLD_WIDTH};

pub struct PatrolMover {
    rect: Rect,
    direction: f32,
    speed: f32,
}

impl PatrolMover {
    pub fn new(x: f32, y: f32, speed: f32) -> Self {
        Self {
            rect: Rect::new(x, y, PLAYER_SIZE, PLAYER_SIZE),
            direction: 1.0,
            speed,
        }
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Advances the patrol by `dt` seconds, clamping to the world and
    /// reversing at either edge.
    pub fn advance(&mut self, dt: f32) {
        let max_x = WORLD_WIDTH - self.rect.w;
        let next = self.rect.x + self.direction * self.speed * dt;
        if next <= 0.0 {
            self.rect.x = 0.0;
            self.direction = 1.0;
        } else if next >= max_x {
            self.rect.x = max_x;
            self.direction = -1.0;
        } else {
            self.rect.x = next;
        }
    }
}
