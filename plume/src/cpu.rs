// A software backend that runs every pass on plain `f32` grids.
//
// The kernels follow the GLSL sources in `shaders/` line for line, so the
// simulation can run headless. Textures are sampled the way GL samples a
// clamp-to-edge texture: bilinear or nearest depending on the filter the
// texture was created with.

use crate::backend::{Backend, Channels, Filter, Pass, PassKind, Target};
use crate::render::Problem;

use std::cell::{Cell, Ref, RefCell};

pub type Texel = [f32; 4];

const EMPTY: Texel = [0.0, 0.0, 0.0, 1.0];

pub struct CpuTexture {
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
    pub filter: Filter,
    texels: RefCell<Vec<Texel>>,
}

impl CpuTexture {
    fn new(width: u32, height: u32, channels: Channels, filter: Filter) -> Self {
        Self {
            width,
            height,
            channels,
            filter,
            texels: RefCell::new(vec![EMPTY; (width * height) as usize]),
        }
    }

    /// The texel at column `x` and row `y`, counting rows from the bottom.
    pub fn texel(&self, x: u32, y: u32) -> Texel {
        self.texels.borrow()[(y * self.width + x) as usize]
    }

    pub fn texels(&self) -> Vec<Texel> {
        self.texels.borrow().clone()
    }

    /// Overwrite every texel. Channels the texture doesn't store are dropped.
    pub fn fill(&self, texel: impl Fn(u32, u32) -> Texel) {
        let mut texels = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                texels.push(texel(x, y));
            }
        }
        self.store(texels);
    }

    fn store(&self, mut texels: Vec<Texel>) {
        for texel in texels.iter_mut() {
            *texel = mask(self.channels, *texel);
        }
        *self.texels.borrow_mut() = texels;
    }

    fn sampler(&self) -> Sampler<'_> {
        Sampler {
            texels: self.texels.borrow(),
            width: self.width as i64,
            height: self.height as i64,
            filter: self.filter,
        }
    }
}

fn mask(channels: Channels, texel: Texel) -> Texel {
    match channels {
        Channels::R => [texel[0], 0.0, 0.0, 1.0],
        Channels::Rg => [texel[0], texel[1], 0.0, 1.0],
        Channels::Rgba => texel,
    }
}

struct Sampler<'a> {
    texels: Ref<'a, Vec<Texel>>,
    width: i64,
    height: i64,
    filter: Filter,
}

impl Sampler<'_> {
    fn fetch(&self, x: i64, y: i64) -> Texel {
        let x = x.clamp(0, self.width - 1);
        let y = y.clamp(0, self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }

    fn sample(&self, uv: [f32; 2]) -> Texel {
        let width = self.width as f32;
        let height = self.height as f32;

        match self.filter {
            Filter::Nearest => self.fetch(
                (uv[0] * width).floor() as i64,
                (uv[1] * height).floor() as i64,
            ),
            Filter::Linear => {
                let s = uv[0] * width - 0.5;
                let t = uv[1] * height - 0.5;
                let (x0, y0) = (s.floor(), t.floor());
                let (fx, fy) = (s - x0, t - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);

                let a = self.fetch(x0, y0);
                let b = self.fetch(x0 + 1, y0);
                let c = self.fetch(x0, y0 + 1);
                let d = self.fetch(x0 + 1, y0 + 1);

                mix(mix(a, b, fx), mix(c, d, fx), fy)
            }
        }
    }

    // Bilinear filtering from four point samples, for devices that can't
    // filter float textures.
    fn bilerp(&self, uv: [f32; 2], texel_size: [f32; 2]) -> Texel {
        let st = [uv[0] / texel_size[0] - 0.5, uv[1] / texel_size[1] - 0.5];
        let iuv = [st[0].floor(), st[1].floor()];
        let fuv = [st[0] - iuv[0], st[1] - iuv[1]];
        let at = |dx: f32, dy: f32| {
            self.sample([(iuv[0] + dx) * texel_size[0], (iuv[1] + dy) * texel_size[1]])
        };

        let a = at(0.5, 0.5);
        let b = at(1.5, 0.5);
        let c = at(0.5, 1.5);
        let d = at(1.5, 1.5);

        mix(mix(a, b, fuv[0]), mix(c, d, fuv[0]), fuv[1])
    }
}

fn mix(a: Texel, b: Texel, t: f32) -> Texel {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

fn length3(v: Texel) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Texture coordinates of one fragment and its four neighbours, as the
/// vertex shader passes them on.
struct Fragment {
    uv: [f32; 2],
    l: [f32; 2],
    r: [f32; 2],
    t: [f32; 2],
    b: [f32; 2],
}

fn rasterize(
    width: u32,
    height: u32,
    texel_size: [f32; 2],
    shader: impl Fn(&Fragment) -> Texel,
) -> Vec<Texel> {
    let mut output = Vec::with_capacity((width * height) as usize);

    for y in 0..height {
        for x in 0..width {
            let uv = [
                (x as f32 + 0.5) / width as f32,
                (y as f32 + 0.5) / height as f32,
            ];
            let fragment = Fragment {
                uv,
                l: [uv[0] - texel_size[0], uv[1]],
                r: [uv[0] + texel_size[0], uv[1]],
                t: [uv[0], uv[1] + texel_size[1]],
                b: [uv[0], uv[1] - texel_size[1]],
            };
            output.push(shader(&fragment));
        }
    }

    output
}

#[derive(Default)]
struct Screen {
    width: u32,
    height: u32,
    pixels: Vec<Texel>,
}

impl Screen {
    fn fit(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            *self = Screen {
                width,
                height,
                pixels: vec![[0.0; 4]; (width * height) as usize],
            };
        }
    }
}

pub struct CpuBackend {
    linear_filtering: bool,
    passes: RefCell<Vec<PassKind>>,
    textures_created: Cell<usize>,
    screen: RefCell<Screen>,
}

impl CpuBackend {
    pub fn new(linear_filtering: bool) -> Self {
        Self {
            linear_filtering,
            passes: RefCell::new(Vec::new()),
            textures_created: Cell::new(0),
            screen: RefCell::new(Screen::default()),
        }
    }

    /// Every pass drawn so far, in order.
    pub fn passes(&self) -> Vec<PassKind> {
        self.passes.borrow().clone()
    }

    pub fn take_passes(&self) -> Vec<PassKind> {
        self.passes.take()
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created.get()
    }

    /// The visible surface, rows from the bottom.
    pub fn screen(&self) -> (u32, u32, Vec<Texel>) {
        let screen = self.screen.borrow();
        (screen.width, screen.height, screen.pixels.clone())
    }

    fn shade(&self, pass: &Pass<'_, CpuTexture>, width: u32, height: u32) -> Vec<Texel> {
        let texel_size = pass.texel_size();

        match *pass {
            Pass::Copy { source } => {
                let source = source.sampler();
                rasterize(width, height, texel_size, |f| source.sample(f.uv))
            }

            Pass::Clear { source, value } => {
                let source = source.sampler();
                rasterize(width, height, texel_size, |f| {
                    source.sample(f.uv).map(|channel| value * channel)
                })
            }

            Pass::Display {
                dye,
                texel_size,
                shading,
            } => {
                let dye = dye.sampler();
                rasterize(width, height, texel_size, |f| {
                    let mut color = dye.sample(f.uv);

                    if shading {
                        let dx = length3(dye.sample(f.r)) - length3(dye.sample(f.l));
                        let dy = length3(dye.sample(f.t)) - length3(dye.sample(f.b));
                        let dz = (texel_size[0] * texel_size[0] + texel_size[1] * texel_size[1])
                            .sqrt();
                        let normal_z = dz / (dx * dx + dy * dy + dz * dz).sqrt();
                        let diffuse = (normal_z + 0.7).clamp(0.7, 1.0);

                        for channel in color.iter_mut().take(3) {
                            *channel *= diffuse;
                        }
                    }

                    let alpha = color[0].max(color[1]).max(color[2]);
                    [color[0], color[1], color[2], alpha]
                })
            }

            Pass::Splat {
                target,
                aspect_ratio,
                point,
                color,
                radius,
            } => {
                let target = target.sampler();
                rasterize(width, height, texel_size, |f| {
                    let offset = [(f.uv[0] - point[0]) * aspect_ratio, f.uv[1] - point[1]];
                    let falloff = (-(offset[0] * offset[0] + offset[1] * offset[1]) / radius).exp();
                    let base = target.sample(f.uv);

                    [
                        base[0] + falloff * color[0],
                        base[1] + falloff * color[1],
                        base[2] + falloff * color[2],
                        1.0,
                    ]
                })
            }

            Pass::Advection {
                velocity,
                source,
                texel_size,
                source_texel_size,
                dt,
                dissipation,
            } => {
                let velocity = velocity.sampler();
                let source = source.sampler();
                let manual_filtering = !self.linear_filtering;
                let decay = 1.0 + dissipation * dt;

                rasterize(width, height, texel_size, |f| {
                    let result = if manual_filtering {
                        let v = velocity.bilerp(f.uv, texel_size);
                        let coord = [
                            f.uv[0] - dt * v[0] * texel_size[0],
                            f.uv[1] - dt * v[1] * texel_size[1],
                        ];
                        source.bilerp(coord, source_texel_size)
                    } else {
                        let v = velocity.sample(f.uv);
                        let coord = [
                            f.uv[0] - dt * v[0] * texel_size[0],
                            f.uv[1] - dt * v[1] * texel_size[1],
                        ];
                        source.sample(coord)
                    };

                    result.map(|channel| channel / decay)
                })
            }

            Pass::Divergence {
                velocity,
                texel_size,
            } => {
                let velocity = velocity.sampler();
                rasterize(width, height, texel_size, |f| {
                    let mut left = velocity.sample(f.l)[0];
                    let mut right = velocity.sample(f.r)[0];
                    let mut top = velocity.sample(f.t)[1];
                    let mut bottom = velocity.sample(f.b)[1];

                    let center = velocity.sample(f.uv);
                    if f.l[0] < 0.0 {
                        left = -center[0];
                    }
                    if f.r[0] > 1.0 {
                        right = -center[0];
                    }
                    if f.t[1] > 1.0 {
                        top = -center[1];
                    }
                    if f.b[1] < 0.0 {
                        bottom = -center[1];
                    }

                    [0.5 * (right - left + top - bottom), 0.0, 0.0, 1.0]
                })
            }

            Pass::Curl {
                velocity,
                texel_size,
            } => {
                let velocity = velocity.sampler();
                rasterize(width, height, texel_size, |f| {
                    let left = velocity.sample(f.l)[1];
                    let right = velocity.sample(f.r)[1];
                    let top = velocity.sample(f.t)[0];
                    let bottom = velocity.sample(f.b)[0];

                    [0.5 * (right - left - top + bottom), 0.0, 0.0, 1.0]
                })
            }

            Pass::Vorticity {
                velocity,
                curl,
                texel_size,
                strength,
                dt,
            } => {
                let velocity = velocity.sampler();
                let curl = curl.sampler();
                rasterize(width, height, texel_size, |f| {
                    let left = curl.sample(f.l)[0];
                    let right = curl.sample(f.r)[0];
                    let top = curl.sample(f.t)[0];
                    let bottom = curl.sample(f.b)[0];
                    let center = curl.sample(f.uv)[0];

                    let mut force = [
                        0.5 * (top.abs() - bottom.abs()),
                        0.5 * (right.abs() - left.abs()),
                    ];
                    let length = (force[0] * force[0] + force[1] * force[1]).sqrt() + 0.0001;
                    force = [
                        force[0] / length * strength * center,
                        -force[1] / length * strength * center,
                    ];

                    let v = velocity.sample(f.uv);
                    [
                        (v[0] + force[0] * dt).clamp(-1000.0, 1000.0),
                        (v[1] + force[1] * dt).clamp(-1000.0, 1000.0),
                        0.0,
                        1.0,
                    ]
                })
            }

            Pass::Pressure {
                pressure,
                divergence,
                texel_size,
            } => {
                let pressure = pressure.sampler();
                let divergence = divergence.sampler();
                rasterize(width, height, texel_size, |f| {
                    let left = pressure.sample(f.l)[0];
                    let right = pressure.sample(f.r)[0];
                    let top = pressure.sample(f.t)[0];
                    let bottom = pressure.sample(f.b)[0];
                    let divergence = divergence.sample(f.uv)[0];

                    [(left + right + bottom + top - divergence) * 0.25, 0.0, 0.0, 1.0]
                })
            }

            Pass::GradientSubtract {
                pressure,
                velocity,
                texel_size,
            } => {
                let pressure = pressure.sampler();
                let velocity = velocity.sampler();
                rasterize(width, height, texel_size, |f| {
                    let left = pressure.sample(f.l)[0];
                    let right = pressure.sample(f.r)[0];
                    let top = pressure.sample(f.t)[0];
                    let bottom = pressure.sample(f.b)[0];

                    let v = velocity.sample(f.uv);
                    [v[0] - (right - left), v[1] - (top - bottom), 0.0, 1.0]
                })
            }
        }
    }
}

// ONE, ONE_MINUS_SRC_ALPHA
fn blend(source: Texel, destination: Texel) -> Texel {
    let keep = 1.0 - source[3];
    [
        source[0] + destination[0] * keep,
        source[1] + destination[1] * keep,
        source[2] + destination[2] * keep,
        source[3] + destination[3] * keep,
    ]
}

impl Backend for CpuBackend {
    type Texture = CpuTexture;

    fn linear_filtering(&self) -> bool {
        self.linear_filtering
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        channels: Channels,
        filter: Filter,
    ) -> Result<CpuTexture, Problem> {
        self.textures_created.set(self.textures_created.get() + 1);
        Ok(CpuTexture::new(width, height, channels, filter))
    }

    fn clear(&self, target: Target<'_, CpuTexture>, color: [f32; 4]) {
        match target {
            Target::Texture(texture) => texture.fill(|_, _| color),
            Target::Screen { width, height } => {
                let mut screen = self.screen.borrow_mut();
                screen.fit(width, height);
                screen.pixels.fill(color);
            }
        }
    }

    fn draw(&self, pass: &Pass<'_, CpuTexture>, target: Target<'_, CpuTexture>) {
        self.passes.borrow_mut().push(pass.kind());

        let (width, height) = match target {
            Target::Texture(texture) => (texture.width, texture.height),
            Target::Screen { width, height } => (width, height),
        };
        let mut output = self.shade(pass, width, height);
        let blending = pass.kind() == PassKind::Display;

        match target {
            Target::Texture(texture) => {
                if blending {
                    for (pixel, destination) in output.iter_mut().zip(texture.texels.borrow().iter())
                    {
                        *pixel = blend(*pixel, *destination);
                    }
                }
                texture.store(output);
            }
            Target::Screen { width, height } => {
                let mut screen = self.screen.borrow_mut();
                screen.fit(width, height);
                for (destination, pixel) in screen.pixels.iter_mut().zip(output) {
                    *destination = if blending {
                        blend(pixel, *destination)
                    } else {
                        pixel
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn texture(backend: &CpuBackend, width: u32, height: u32, channels: Channels) -> CpuTexture {
        backend
            .create_texture(width, height, channels, Filter::Linear)
            .expect("cpu texture")
    }

    #[test]
    fn new_textures_are_opaque_black() {
        let backend = CpuBackend::new(true);
        let dye = texture(&backend, 3, 2, Channels::Rgba);

        assert!(dye.texels().iter().all(|texel| *texel == EMPTY));
        assert_eq!(backend.textures_created(), 1);
    }

    #[test]
    fn narrow_textures_drop_extra_channels() {
        let backend = CpuBackend::new(true);
        let pressure = texture(&backend, 2, 2, Channels::R);
        let velocity = texture(&backend, 2, 2, Channels::Rg);

        pressure.fill(|_, _| [1.0, 2.0, 3.0, 4.0]);
        velocity.fill(|_, _| [1.0, 2.0, 3.0, 4.0]);

        assert_eq!(pressure.texel(1, 1), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(velocity.texel(1, 1), [1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn linear_sampling_interpolates_and_clamps() {
        let backend = CpuBackend::new(true);
        let source = texture(&backend, 2, 1, Channels::R);
        source.fill(|x, _| [x as f32, 0.0, 0.0, 1.0]);
        let sampler = source.sampler();

        assert_relative_eq!(sampler.sample([0.25, 0.5])[0], 0.0);
        assert_relative_eq!(sampler.sample([0.5, 0.5])[0], 0.5);
        assert_relative_eq!(sampler.sample([0.75, 0.5])[0], 1.0);
        assert_relative_eq!(sampler.sample([1.5, 0.5])[0], 1.0);
        assert_relative_eq!(sampler.sample([-1.0, 0.5])[0], 0.0);
    }

    #[test]
    fn manual_bilerp_matches_hardware_filtering() {
        let backend = CpuBackend::new(false);
        let linear = texture(&backend, 4, 4, Channels::R);
        let nearest = backend
            .create_texture(4, 4, Channels::R, Filter::Nearest)
            .expect("cpu texture");
        let pattern = |x: u32, y: u32| [(x * 3 + y * 5) as f32, 0.0, 0.0, 1.0];
        linear.fill(pattern);
        nearest.fill(pattern);

        let (linear, nearest) = (linear.sampler(), nearest.sampler());
        for uv in [[0.3, 0.6], [0.5, 0.5], [0.41, 0.77]] {
            assert_relative_eq!(
                nearest.bilerp(uv, [0.25, 0.25])[0],
                linear.sample(uv)[0],
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn splats_accumulate() {
        let backend = CpuBackend::new(true);
        let read = texture(&backend, 8, 8, Channels::Rgba);
        let write = texture(&backend, 8, 8, Channels::Rgba);
        let splat = |target: &CpuTexture, into: &CpuTexture| {
            backend.draw(
                &Pass::Splat {
                    target,
                    aspect_ratio: 1.0,
                    point: [0.5625, 0.5625],
                    color: [0.5, 0.25, 0.0],
                    radius: 0.01,
                },
                Target::Texture(into),
            )
        };

        splat(&read, &write);
        splat(&write, &read);

        // The texel centered on the point gets the full color twice.
        assert_relative_eq!(read.texel(4, 4)[0], 1.0);
        assert_relative_eq!(read.texel(4, 4)[1], 0.5);
        assert!(read.texel(0, 0)[0] < 1e-6);
        assert_eq!(backend.passes(), vec![PassKind::Splat, PassKind::Splat]);
    }

    #[test]
    fn divergence_mirrors_the_center_at_walls() {
        let backend = CpuBackend::new(true);
        let velocity = texture(&backend, 4, 4, Channels::Rg);
        let divergence = texture(&backend, 4, 4, Channels::R);
        velocity.fill(|_, _| [1.0, 0.0, 0.0, 1.0]);

        backend.draw(
            &Pass::Divergence {
                velocity: &velocity,
                texel_size: [0.25, 0.25],
            },
            Target::Texture(&divergence),
        );

        // Uniform flow only diverges where it meets a wall.
        assert_relative_eq!(divergence.texel(1, 1)[0], 0.0);
        assert_relative_eq!(divergence.texel(0, 1)[0], 1.0);
        assert_relative_eq!(divergence.texel(3, 1)[0], -1.0);
    }

    #[test]
    fn curl_of_a_shear_flow() {
        let backend = CpuBackend::new(true);
        let velocity = texture(&backend, 4, 4, Channels::Rg);
        let curl = texture(&backend, 4, 4, Channels::R);
        // v = (0, x): rotates counter-clockwise.
        velocity.fill(|x, _| [0.0, x as f32, 0.0, 1.0]);

        backend.draw(
            &Pass::Curl {
                velocity: &velocity,
                texel_size: [0.25, 0.25],
            },
            Target::Texture(&curl),
        );

        assert_relative_eq!(curl.texel(1, 1)[0], 1.0);
        assert_relative_eq!(curl.texel(2, 2)[0], 1.0);
    }

    #[test]
    fn display_derives_alpha_and_blends() {
        let backend = CpuBackend::new(true);
        let dye = texture(&backend, 2, 2, Channels::Rgba);
        dye.fill(|_, _| [0.2, 0.6, 0.4, 1.0]);
        let screen = Target::Screen {
            width: 2,
            height: 2,
        };

        backend.clear(screen, [0.5, 0.0, 0.0, 1.0]);
        backend.draw(
            &Pass::Display {
                dye: &dye,
                texel_size: [0.5, 0.5],
                shading: false,
            },
            screen,
        );

        let (width, height, pixels) = backend.screen();
        assert_eq!((width, height), (2, 2));
        let pixel = pixels[0];
        assert_relative_eq!(pixel[0], 0.2 + 0.5 * 0.4, epsilon = 1e-6);
        assert_relative_eq!(pixel[1], 0.6, epsilon = 1e-6);
        assert_relative_eq!(pixel[2], 0.4, epsilon = 1e-6);
        assert_relative_eq!(pixel[3], 0.6 + 0.4, epsilon = 1e-6);
    }

    #[test]
    fn shading_darkens_steep_slopes() {
        let backend = CpuBackend::new(true);
        let dye = texture(&backend, 8, 8, Channels::Rgba);
        dye.fill(|x, _| [0.5 * x as f32, 0.0, 0.0, 1.0]);
        let screen = Target::Screen {
            width: 8,
            height: 8,
        };

        backend.clear(screen, [0.0; 4]);
        backend.draw(
            &Pass::Display {
                dye: &dye,
                texel_size: [0.125, 0.125],
                shading: true,
            },
            screen,
        );

        let (_, _, pixels) = backend.screen();
        let unshaded = 0.5 * 4.0;
        assert!(pixels[4][0] < unshaded);
        assert!(pixels[4][0] >= 0.7 * unshaded);
    }
}
