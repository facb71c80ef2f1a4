// Common geometries

// A full-screen quad, drawn as a triangle strip.
#[rustfmt::skip]
pub static QUAD_VERTICES: [f32; 8] = [
    -1.0, -1.0,
    -1.0,  1.0,
     1.0, -1.0,
     1.0,  1.0,
];

pub const QUAD_VERTEX_COUNT: i32 = 4;
