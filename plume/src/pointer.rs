use crate::color;
use crate::framebuffer::Size;

/// The identifier of the mouse pointer. Touches use their platform id.
pub const MOUSE: i64 = -1;

#[derive(Clone, Debug, PartialEq)]
pub struct Pointer {
    pub id: i64,
    /// Normalized position with the origin at the bottom left.
    pub texcoord: [f32; 2],
    pub prev_texcoord: [f32; 2],
    /// Displacement since the last move, corrected for the aspect ratio.
    pub delta: [f32; 2],
    pub down: bool,
    pub color: [f32; 3],

    // Set by input, cleared by the frame that turns it into a splat.
    moved: bool,
    clicked: bool,
}

impl Pointer {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            texcoord: [0.0, 0.0],
            prev_texcoord: [0.0, 0.0],
            delta: [0.0, 0.0],
            down: false,
            color: [0.0, 0.0, 0.0],
            moved: false,
            clicked: false,
        }
    }

    pub fn press(&mut self, id: i64, position: [f32; 2], surface: Size, color: [f32; 3]) {
        self.id = id;
        self.down = true;
        self.moved = false;
        self.texcoord = texcoord(position, surface);
        self.prev_texcoord = self.texcoord;
        self.delta = [0.0, 0.0];
        self.color = color;
    }

    pub fn move_to(&mut self, position: [f32; 2], surface: Size, color: [f32; 3]) {
        self.prev_texcoord = self.texcoord;
        self.texcoord = texcoord(position, surface);
        self.delta = correct_delta(
            [
                self.texcoord[0] - self.prev_texcoord[0],
                self.texcoord[1] - self.prev_texcoord[1],
            ],
            surface,
        );
        self.moved = self.delta[0].abs() > 0.0 || self.delta[1].abs() > 0.0;
        self.color = color;
    }

    /// Position and color stay, so the next press can reuse the record.
    pub fn release(&mut self) {
        self.down = false;
    }

    pub fn click(&mut self) {
        self.clicked = true;
    }

    pub fn is_moved(&self) -> bool {
        self.moved
    }

    /// Consume a pending move.
    pub fn take_moved(&mut self) -> bool {
        std::mem::take(&mut self.moved)
    }

    /// Consume a pending click.
    pub fn take_click(&mut self) -> bool {
        std::mem::take(&mut self.clicked)
    }
}

/// Screen pixels to texture coordinates. Screen rows grow downwards,
/// texture rows upwards.
pub fn texcoord(position: [f32; 2], surface: Size) -> [f32; 2] {
    [
        position[0] / surface.width as f32,
        1.0 - position[1] / surface.height as f32,
    ]
}

/// Scale a texture space displacement so that both components are measured
/// against the longer side of the surface. Equal distances on screen then
/// give equal deltas.
pub fn correct_delta(delta: [f32; 2], surface: Size) -> [f32; 2] {
    let width = surface.width as f32;
    let height = surface.height as f32;
    let longest = width.max(height);

    [delta[0] * width / longest, delta[1] * height / longest]
}

/// All pointers. The mouse always sits at index 0.
#[derive(Clone, Debug)]
pub struct Pointers {
    pointers: Vec<Pointer>,
    color_timer: f32,
}

impl Default for Pointers {
    fn default() -> Self {
        Self::new()
    }
}

impl Pointers {
    pub fn new() -> Self {
        Self {
            pointers: vec![Pointer::new(MOUSE)],
            color_timer: 0.0,
        }
    }

    pub fn mouse(&self) -> &Pointer {
        &self.pointers[0]
    }

    pub fn get(&self, id: i64) -> Option<&Pointer> {
        self.pointers.iter().find(|pointer| pointer.id == id)
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pointer> {
        self.pointers.iter_mut()
    }

    pub fn press(&mut self, id: i64, position: [f32; 2], surface: Size) {
        let color = color::generate();
        let index = match self.position(id) {
            Some(index) => index,
            // Reuse a released touch before growing.
            None if id != MOUSE => match self
                .pointers
                .iter()
                .skip(1)
                .position(|pointer| !pointer.down)
            {
                Some(index) => index + 1,
                None => {
                    self.pointers.push(Pointer::new(id));
                    self.pointers.len() - 1
                }
            },
            None => 0,
        };

        self.pointers[index].press(id, position, surface, color);
    }

    pub fn move_to(&mut self, id: i64, position: [f32; 2], surface: Size) {
        if let Some(index) = self.position(id) {
            let pointer = &mut self.pointers[index];
            let color = pointer.color;
            pointer.move_to(position, surface, color);
        }
    }

    pub fn release(&mut self, id: i64) {
        if let Some(index) = self.position(id) {
            self.pointers[index].release();
        }
    }

    /// Queue a click on the mouse pointer.
    pub fn click(&mut self) {
        self.pointers[0].click();
    }

    /// Advance the color cycle. Every time the timer passes 1 all pointers
    /// get a new color and the remainder carries over.
    pub fn update_colors(&mut self, dt: f32, speed: f32) {
        self.color_timer += dt * speed;

        if self.color_timer >= 1.0 {
            self.color_timer %= 1.0;

            for pointer in self.pointers.iter_mut() {
                pointer.color = color::generate();
            }
        }
    }

    pub fn color_timer(&self) -> f32 {
        self.color_timer
    }

    // The mouse matches by sentinel. The mouse record always exists.
    fn position(&self, id: i64) -> Option<usize> {
        if id == MOUSE {
            return Some(0);
        }

        self.pointers
            .iter()
            .skip(1)
            .position(|pointer| pointer.id == id)
            .map(|index| index + 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rng;
    use approx::assert_relative_eq;

    // The aspect correction as two separate conditionals.
    fn conditional_delta(delta: [f32; 2], surface: Size) -> [f32; 2] {
        let aspect_ratio = surface.aspect_ratio();
        let mut corrected = delta;
        if aspect_ratio < 1.0 {
            corrected[0] *= aspect_ratio;
        }
        if aspect_ratio > 1.0 {
            corrected[1] /= aspect_ratio;
        }
        corrected
    }

    #[test]
    fn press_flips_y_and_resets() {
        let surface = Size::new(400, 200);
        let mut pointer = Pointer::new(MOUSE);
        pointer.move_to([10.0, 10.0], surface, [0.0; 3]);

        pointer.press(MOUSE, [100.0, 50.0], surface, [0.1, 0.2, 0.3]);

        assert_eq!(pointer.texcoord, [0.25, 0.75]);
        assert_eq!(pointer.prev_texcoord, pointer.texcoord);
        assert_eq!(pointer.delta, [0.0, 0.0]);
        assert!(pointer.down);
        assert!(!pointer.is_moved());
        assert_eq!(pointer.color, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn moves_are_consumed_once() {
        let surface = Size::new(512, 512);
        let mut pointer = Pointer::new(MOUSE);
        pointer.press(MOUSE, [256.0, 256.0], surface, [0.0; 3]);
        pointer.move_to([307.2, 256.0], surface, [0.0; 3]);

        assert_relative_eq!(pointer.delta[0], 0.1, epsilon = 1e-6);
        assert_relative_eq!(pointer.delta[1], 0.0);
        assert!(pointer.take_moved());
        assert!(!pointer.take_moved());
    }

    #[test]
    fn standing_still_is_not_a_move() {
        let surface = Size::new(512, 512);
        let mut pointer = Pointer::new(MOUSE);
        pointer.press(MOUSE, [100.0, 100.0], surface, [0.0; 3]);
        pointer.move_to([100.0, 100.0], surface, [0.0; 3]);

        assert!(!pointer.is_moved());
    }

    #[test]
    fn release_keeps_position_and_color() {
        let surface = Size::new(512, 512);
        let mut pointer = Pointer::new(3);
        pointer.press(3, [128.0, 128.0], surface, [0.5, 0.5, 0.5]);
        pointer.release();

        assert!(!pointer.down);
        assert_eq!(pointer.texcoord, [0.25, 0.75]);
        assert_eq!(pointer.color, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn corrected_delta_keeps_the_sign() {
        let surfaces = [
            Size::new(1920, 1080),
            Size::new(1080, 1920),
            Size::new(512, 512),
            Size::new(3, 1000),
        ];
        let moves = [
            [12.0, -3.0],
            [-7.5, 0.0],
            [0.0, 40.0],
            [-0.5, -0.5],
            [100.0, 100.0],
        ];

        for surface in surfaces {
            for movement in moves {
                let mut pointer = Pointer::new(MOUSE);
                pointer.press(MOUSE, [1.0, 1.0], surface, [0.0; 3]);
                pointer.move_to([1.0 + movement[0], 1.0 + movement[1]], surface, [0.0; 3]);

                // Screen y points down, texture y up.
                let expected = [movement[0], -movement[1]];
                for (delta, expected) in pointer.delta.iter().zip(expected) {
                    assert_eq!(*delta > 0.0, expected > 0.0);
                    assert_eq!(*delta < 0.0, expected < 0.0);
                }
            }
        }
    }

    #[test]
    fn corrected_delta_matches_the_conditionals() {
        for surface in [Size::new(1600, 900), Size::new(900, 1600), Size::new(700, 700)] {
            for delta in [[0.1, 0.2], [-0.3, 0.05]] {
                let corrected = correct_delta(delta, surface);
                let expected = conditional_delta(delta, surface);

                assert_relative_eq!(corrected[0], expected[0], epsilon = 1e-6);
                assert_relative_eq!(corrected[1], expected[1], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn touches_are_matched_by_id() {
        let surface = Size::new(100, 100);
        let mut pointers = Pointers::new();

        pointers.press(7, [10.0, 10.0], surface);
        pointers.press(9, [50.0, 50.0], surface);
        assert_eq!(pointers.len(), 3);

        pointers.move_to(9, [60.0, 50.0], surface);
        assert!(pointers.get(9).map_or(false, Pointer::is_moved));
        assert!(!pointers.get(7).map_or(true, Pointer::is_moved));
        assert!(!pointers.mouse().is_moved());

        // Unknown ids are ignored.
        pointers.move_to(42, [0.0, 0.0], surface);
        pointers.release(42);
        assert_eq!(pointers.len(), 3);

        // A released touch record is reused for a new id.
        pointers.release(7);
        pointers.press(11, [20.0, 20.0], surface);
        assert_eq!(pointers.len(), 3);
        assert!(pointers.get(7).is_none());
        assert!(pointers.get(11).map_or(false, |pointer| pointer.down));
    }

    #[test]
    fn mouse_is_always_first() {
        let surface = Size::new(100, 100);
        let mut pointers = Pointers::new();

        pointers.press(1, [10.0, 10.0], surface);
        pointers.press(MOUSE, [30.0, 30.0], surface);

        assert_eq!(pointers.mouse().id, MOUSE);
        assert!(pointers.mouse().down);
        assert_eq!(pointers.len(), 2);
    }

    #[test]
    fn color_cycle_keeps_the_remainder() {
        rng::reseed(Some("cycle"));
        let surface = Size::new(100, 100);
        let mut pointers = Pointers::new();
        pointers.press(MOUSE, [10.0, 10.0], surface);
        let initial = pointers.mouse().color;

        pointers.update_colors(0.05, 10.0);
        assert_relative_eq!(pointers.color_timer(), 0.5, epsilon = 1e-6);
        assert_eq!(pointers.mouse().color, initial);

        pointers.update_colors(0.07, 10.0);
        assert_relative_eq!(pointers.color_timer(), 0.2, epsilon = 1e-5);
        assert_ne!(pointers.mouse().color, initial);
    }
}
