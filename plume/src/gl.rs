use crate::backend::{Backend, Channels, Filter, Pass, Target};
use crate::capabilities::Capabilities;
use crate::data;
use crate::render::{
    self, Buffer, Context, Problem, Program, RenderTarget, TextureOptions, Uniform, UniformValue,
};

use glow::HasContext;
use std::rc::Rc;

static BASE_VERT_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/base.vert"));
static COPY_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/copy.frag"));
static CLEAR_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/clear.frag"));
static DISPLAY_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/display.frag"));
static SPLAT_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/splat.frag"));
static ADVECTION_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/advection.frag"));
static DIVERGENCE_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/divergence.frag"));
static CURL_FRAG_SHADER: &str = include_str!(concat!(env!("OUT_DIR"), "/shaders/curl.frag"));
static VORTICITY_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/vorticity.frag"));
static PRESSURE_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/pressure.frag"));
static GRADIENT_SUBTRACT_FRAG_SHADER: &str =
    include_str!(concat!(env!("OUT_DIR"), "/shaders/gradient_subtract.frag"));

pub const SHADING: &str = "SHADING";
pub const MANUAL_FILTERING: &str = "MANUAL_FILTERING";

/// Every program the simulation runs, linked once up front.
pub struct Programs {
    pub copy: Program,
    pub clear: Program,
    pub display: Program,
    pub display_shaded: Program,
    pub splat: Program,
    pub advection: Program,
    pub divergence: Program,
    pub curl: Program,
    pub vorticity: Program,
    pub pressure: Program,
    pub gradient_subtract: Program,
}

impl Programs {
    pub fn new(context: &Context, manual_filtering: bool) -> Result<Self, Problem> {
        let vertex_shader =
            render::compile_shader(context, glow::VERTEX_SHADER, BASE_VERT_SHADER)?;

        let programs = Self::link(context, vertex_shader, manual_filtering);

        unsafe {
            context.delete_shader(vertex_shader);
        }

        programs
    }

    fn link(
        context: &Context,
        vertex_shader: glow::Shader,
        manual_filtering: bool,
    ) -> Result<Self, Problem> {
        let advection_features: &[&'static str] = if manual_filtering {
            &[MANUAL_FILTERING]
        } else {
            &[]
        };
        let program = |source: &str, features: &[&'static str]| {
            Program::new(context, vertex_shader, source, features)
        };

        Ok(Self {
            copy: program(COPY_FRAG_SHADER, &[])?,
            clear: program(CLEAR_FRAG_SHADER, &[])?,
            display: program(DISPLAY_FRAG_SHADER, &[])?,
            display_shaded: program(DISPLAY_FRAG_SHADER, &[SHADING])?,
            splat: program(SPLAT_FRAG_SHADER, &[])?,
            advection: program(ADVECTION_FRAG_SHADER, advection_features)?,
            divergence: program(DIVERGENCE_FRAG_SHADER, &[])?,
            curl: program(CURL_FRAG_SHADER, &[])?,
            vorticity: program(VORTICITY_FRAG_SHADER, &[])?,
            pressure: program(PRESSURE_FRAG_SHADER, &[])?,
            gradient_subtract: program(GRADIENT_SUBTRACT_FRAG_SHADER, &[])?,
        })
    }
}

pub struct GlBackend {
    context: Context,
    capabilities: Capabilities,
    quad: Buffer,
    programs: Programs,
}

impl GlBackend {
    pub fn new(context: &Context, capabilities: Capabilities) -> Result<Self, Problem> {
        let programs = Programs::new(context, !capabilities.linear_filtering)?;
        let quad = Buffer::from_f32(
            context,
            &data::QUAD_VERTICES,
            glow::ARRAY_BUFFER,
            glow::STATIC_DRAW,
        )?;

        log::debug!(
            "Linked programs. Manual filtering: {}",
            programs.advection.has_feature(MANUAL_FILTERING)
        );

        Ok(Self {
            context: Rc::clone(context),
            capabilities,
            quad,
            programs,
        })
    }

    // Bind the inputs and uniforms of a pass and return its program.
    fn prepare(&self, pass: &Pass<'_, RenderTarget>) -> &Program {
        let texel_size = pass.texel_size();
        let texel_size_uniform = Uniform {
            name: "texelSize",
            value: UniformValue::Vec2(&texel_size),
        };

        match *pass {
            Pass::Copy { source } => {
                let program = &self.programs.copy;
                program.set_uniforms(&[&Uniform {
                    name: "uTexture",
                    value: UniformValue::Texture2D(source.attach(0)),
                }]);
                program
            }

            Pass::Clear { source, value } => {
                let program = &self.programs.clear;
                program.set_uniforms(&[
                    &Uniform {
                        name: "uTexture",
                        value: UniformValue::Texture2D(source.attach(0)),
                    },
                    &Uniform {
                        name: "value",
                        value: UniformValue::Float(value),
                    },
                ]);
                program
            }

            Pass::Display { dye, shading, .. } => {
                let program = if shading {
                    &self.programs.display_shaded
                } else {
                    &self.programs.display
                };
                program.set_uniforms(&[
                    &texel_size_uniform,
                    &Uniform {
                        name: "uTexture",
                        value: UniformValue::Texture2D(dye.attach(0)),
                    },
                ]);
                program
            }

            Pass::Splat {
                target,
                aspect_ratio,
                ref point,
                ref color,
                radius,
            } => {
                let program = &self.programs.splat;
                program.set_uniforms(&[
                    &Uniform {
                        name: "uTarget",
                        value: UniformValue::Texture2D(target.attach(0)),
                    },
                    &Uniform {
                        name: "aspectRatio",
                        value: UniformValue::Float(aspect_ratio),
                    },
                    &Uniform {
                        name: "point",
                        value: UniformValue::Vec2(point),
                    },
                    &Uniform {
                        name: "color",
                        value: UniformValue::Vec3(color),
                    },
                    &Uniform {
                        name: "radius",
                        value: UniformValue::Float(radius),
                    },
                ]);
                program
            }

            Pass::Advection {
                velocity,
                source,
                ref source_texel_size,
                dt,
                dissipation,
                ..
            } => {
                let program = &self.programs.advection;
                program.set_uniforms(&[
                    &texel_size_uniform,
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(velocity.attach(0)),
                    },
                    &Uniform {
                        name: "uSource",
                        value: UniformValue::Texture2D(source.attach(1)),
                    },
                    &Uniform {
                        name: "dt",
                        value: UniformValue::Float(dt),
                    },
                    &Uniform {
                        name: "dissipation",
                        value: UniformValue::Float(dissipation),
                    },
                ]);
                // Only the hand-filtered variant samples in dye space.
                if program.has_feature(MANUAL_FILTERING) {
                    program.set_uniforms(&[&Uniform {
                        name: "dyeTexelSize",
                        value: UniformValue::Vec2(source_texel_size),
                    }]);
                }
                program
            }

            Pass::Divergence { velocity, .. } => {
                let program = &self.programs.divergence;
                program.set_uniforms(&[
                    &texel_size_uniform,
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(velocity.attach(0)),
                    },
                ]);
                program
            }

            Pass::Curl { velocity, .. } => {
                let program = &self.programs.curl;
                program.set_uniforms(&[
                    &texel_size_uniform,
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(velocity.attach(0)),
                    },
                ]);
                program
            }

            Pass::Vorticity {
                velocity,
                curl,
                strength,
                dt,
                ..
            } => {
                let program = &self.programs.vorticity;
                program.set_uniforms(&[
                    &texel_size_uniform,
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(velocity.attach(0)),
                    },
                    &Uniform {
                        name: "uCurl",
                        value: UniformValue::Texture2D(curl.attach(1)),
                    },
                    &Uniform {
                        name: "curl",
                        value: UniformValue::Float(strength),
                    },
                    &Uniform {
                        name: "dt",
                        value: UniformValue::Float(dt),
                    },
                ]);
                program
            }

            Pass::Pressure {
                pressure,
                divergence,
                ..
            } => {
                let program = &self.programs.pressure;
                program.set_uniforms(&[
                    &texel_size_uniform,
                    &Uniform {
                        name: "uPressure",
                        value: UniformValue::Texture2D(pressure.attach(0)),
                    },
                    &Uniform {
                        name: "uDivergence",
                        value: UniformValue::Texture2D(divergence.attach(1)),
                    },
                ]);
                program
            }

            Pass::GradientSubtract {
                pressure, velocity, ..
            } => {
                let program = &self.programs.gradient_subtract;
                program.set_uniforms(&[
                    &texel_size_uniform,
                    &Uniform {
                        name: "uPressure",
                        value: UniformValue::Texture2D(pressure.attach(0)),
                    },
                    &Uniform {
                        name: "uVelocity",
                        value: UniformValue::Texture2D(velocity.attach(1)),
                    },
                ]);
                program
            }
        }
    }

    fn bind_target(&self, target: Target<'_, RenderTarget>) {
        let (framebuffer, width, height) = match target {
            Target::Texture(texture) => (Some(texture.id), texture.width, texture.height),
            Target::Screen { width, height } => (None, width, height),
        };

        unsafe {
            self.context
                .bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
            self.context.viewport(0, 0, width as i32, height as i32);
        }
    }
}

impl Backend for GlBackend {
    type Texture = RenderTarget;

    fn linear_filtering(&self) -> bool {
        self.capabilities.linear_filtering
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        channels: Channels,
        filter: Filter,
    ) -> Result<RenderTarget, Problem> {
        let options = TextureOptions {
            filter: match filter {
                Filter::Linear => glow::LINEAR,
                Filter::Nearest => glow::NEAREST,
            },
            format: self.capabilities.format(channels),
            type_: self.capabilities.texel_type(),
        };

        RenderTarget::new(&self.context, width, height, options)
    }

    fn clear(&self, target: Target<'_, RenderTarget>, color: [f32; 4]) {
        self.bind_target(target);

        unsafe {
            self.context
                .clear_color(color[0], color[1], color[2], color[3]);
            self.context.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw(&self, pass: &Pass<'_, RenderTarget>, target: Target<'_, RenderTarget>) {
        self.prepare(pass).use_program();

        unsafe {
            if let Pass::Display { .. } = pass {
                self.context
                    .blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
                self.context.enable(glow::BLEND);
            } else {
                self.context.disable(glow::BLEND);
            }
        }

        self.bind_target(target);

        unsafe {
            self.context
                .bind_buffer(glow::ARRAY_BUFFER, Some(self.quad.id));
            self.context.enable_vertex_attrib_array(0);
            self.context
                .vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 0, 0);
            self.context
                .draw_arrays(glow::TRIANGLE_STRIP, 0, data::QUAD_VERTEX_COUNT);
        }
    }
}
