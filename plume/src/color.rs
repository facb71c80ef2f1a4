use crate::rng;

// Keeps the dye dim enough that overlapping splats don't blow out.
const INTENSITY: f32 = 0.15;

pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [f32; 3] {
    let sector = (hue * 6.0).floor();
    let f = hue * 6.0 - sector;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - f * saturation);
    let t = value * (1.0 - (1.0 - f) * saturation);

    match (sector as i32).rem_euclid(6) {
        0 => [value, t, p],
        1 => [q, value, p],
        2 => [p, value, t],
        3 => [p, q, value],
        4 => [t, p, value],
        _ => [value, p, q],
    }
}

/// A random, fully saturated hue.
pub fn generate() -> [f32; 3] {
    hsv_to_rgb(rng::unit(), 1.0, 1.0).map(|channel| channel * INTENSITY)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn primary_hues() {
        let cases = [
            (0.0, [1.0, 0.0, 0.0]),
            (1.0 / 3.0, [0.0, 1.0, 0.0]),
            (2.0 / 3.0, [0.0, 0.0, 1.0]),
            (1.0, [1.0, 0.0, 0.0]),
        ];

        for (hue, expected) in cases {
            let rgb = hsv_to_rgb(hue, 1.0, 1.0);
            for (channel, expected) in rgb.iter().zip(expected) {
                assert_relative_eq!(*channel, expected, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn in_between_hues() {
        let [r, g, b] = hsv_to_rgb(1.0 / 12.0, 1.0, 1.0);
        assert_relative_eq!(r, 1.0);
        assert_relative_eq!(g, 0.5, epsilon = 1e-6);
        assert_relative_eq!(b, 0.0);
    }

    #[test]
    fn generated_colors_are_dim() {
        rng::reseed(Some("colors"));

        for _ in 0..32 {
            let color = generate();
            let brightest = color.iter().cloned().fold(0.0, f32::max);
            assert_relative_eq!(brightest, INTENSITY);
            assert!(color.iter().all(|channel| (0.0..=INTENSITY).contains(channel)));
        }
    }
}
