use glow::HasContext;
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::rc::Rc;
use thiserror::Error;

pub type Context = Rc<glow::Context>;
type GlDataType = u32;
type Result<T> = std::result::Result<T, Problem>;

#[derive(Error, Debug)]
pub enum Problem {
    #[error("Cannot create buffer")]
    CannotCreateBuffer,

    #[error("Cannot create texture")]
    CannotCreateTexture,

    #[error("Cannot create framebuffer")]
    CannotCreateFramebuffer,

    #[error("Framebuffer is incomplete. Status: {0:#x}")]
    IncompleteFramebuffer(u32),

    #[error("{}", match .0 {
        Some(n) => format!("Cannot create shader: {}", n),
        None => "Cannot create shader".to_string(),
    })]
    CannotCreateShader(Option<String>),

    #[error("Cannot create program")]
    CannotCreateProgram,

    #[error("Cannot link program: {0}")]
    CannotLinkProgram(String),
}

pub struct Buffer {
    context: Context,
    pub id: glow::Buffer,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.context.delete_buffer(self.id);
        }
    }
}

impl Buffer {
    pub fn from_bytes(
        context: &Context,
        data: &[u8],
        buffer_type: u32,
        usage: u32,
    ) -> Result<Self> {
        let buffer = unsafe {
            let buffer = context
                .create_buffer()
                .map_err(|_| Problem::CannotCreateBuffer)?;

            context.bind_buffer(buffer_type, Some(buffer));
            context.buffer_data_u8_slice(buffer_type, data, usage);
            context.bind_buffer(buffer_type, None);

            buffer
        };

        Ok(Self {
            context: Rc::clone(context),
            id: buffer,
        })
    }

    pub fn from_f32(context: &Context, data: &[f32], buffer_type: u32, usage: u32) -> Result<Self> {
        Self::from_bytes(context, bytemuck::cast_slice(data), buffer_type, usage)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureFormat {
    pub internal_format: GlDataType,
    pub format: GlDataType,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureOptions {
    pub filter: GlDataType,
    pub format: TextureFormat,
    pub type_: GlDataType,
}

/// A texture with a framebuffer attached to it.
///
/// Every new target is cleared to opaque black.
pub struct RenderTarget {
    context: Context,
    pub id: glow::Framebuffer,
    pub texture: glow::Texture,
    pub width: u32,
    pub height: u32,
    pub options: TextureOptions,
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            self.context
                .bind_framebuffer(glow::FRAMEBUFFER, Some(self.id));
            self.context.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                None,
                0,
            );
            self.context.bind_framebuffer(glow::FRAMEBUFFER, None);
            self.context.delete_framebuffer(self.id);
            self.context.delete_texture(self.texture);
        }
    }
}

impl RenderTarget {
    pub fn new(context: &Context, width: u32, height: u32, options: TextureOptions) -> Result<Self> {
        let (framebuffer, texture) = unsafe {
            context.active_texture(glow::TEXTURE0);
            let texture = context
                .create_texture()
                .map_err(|_| Problem::CannotCreateTexture)?;

            context.bind_texture(glow::TEXTURE_2D, Some(texture));
            context.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                options.filter as i32,
            );
            context.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                options.filter as i32,
            );
            context.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            context.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            context.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                options.format.internal_format as i32,
                width as i32,
                height as i32,
                0,
                options.format.format,
                options.type_,
                None,
            );

            let framebuffer = match context.create_framebuffer() {
                Ok(framebuffer) => framebuffer,
                Err(_) => {
                    context.delete_texture(texture);
                    return Err(Problem::CannotCreateFramebuffer);
                }
            };

            context.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            context.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );

            // Incomplete framebuffers can't be cleared.
            let status = context.check_framebuffer_status(glow::FRAMEBUFFER);
            if let Err(problem) = completeness(status) {
                context.bind_framebuffer(glow::FRAMEBUFFER, None);
                context.delete_framebuffer(framebuffer);
                context.delete_texture(texture);
                return Err(problem);
            }

            context.viewport(0, 0, width as i32, height as i32);
            context.clear_color(0.0, 0.0, 0.0, 1.0);
            context.clear(glow::COLOR_BUFFER_BIT);
            context.bind_framebuffer(glow::FRAMEBUFFER, None);

            (framebuffer, texture)
        };

        Ok(Self {
            context: Rc::clone(context),
            id: framebuffer,
            texture,
            width,
            height,
            options,
        })
    }

    /// Bind the texture to a texture unit and return the unit.
    pub fn attach(&self, unit: u32) -> u32 {
        unsafe {
            self.context.active_texture(glow::TEXTURE0 + unit);
            self.context
                .bind_texture(glow::TEXTURE_2D, Some(self.texture));
        }

        unit
    }
}

pub struct Program {
    context: Context,
    pub program: glow::Program,
    uniforms: FxHashMap<String, glow::UniformLocation>,
    features: Vec<&'static str>,
}

impl Drop for Program {
    fn drop(&mut self) {
        unsafe {
            self.context.delete_program(self.program);
        }
    }
}

impl Program {
    /// Link a fragment shader against a shared, already compiled vertex
    /// shader. Each feature becomes a `#define` in the fragment source.
    pub fn new(
        context: &Context,
        vertex_shader: glow::Shader,
        fragment_source: &str,
        features: &[&'static str],
    ) -> Result<Self> {
        let variables: Vec<(&'static str, &str)> =
            features.iter().map(|feature| (*feature, "1")).collect();
        let fragment_shader = compile_shader(
            context,
            glow::FRAGMENT_SHADER,
            &preprocess_shader(fragment_source, Some(variables.as_slice())),
        )?;

        let program = unsafe {
            let program = match context.create_program() {
                Ok(program) => program,
                Err(_) => {
                    context.delete_shader(fragment_shader);
                    return Err(Problem::CannotCreateProgram);
                }
            };
            context.attach_shader(program, vertex_shader);
            context.attach_shader(program, fragment_shader);
            context.bind_attrib_location(program, 0, "aPosition");
            context.link_program(program);

            let linked = context.get_program_link_status(program);

            context.detach_shader(program, vertex_shader);
            context.detach_shader(program, fragment_shader);
            context.delete_shader(fragment_shader);

            if !linked {
                let info = context.get_program_info_log(program);
                context.delete_program(program);
                return Err(Problem::CannotLinkProgram(info));
            }

            program
        };

        // Get uniform locations
        let mut uniforms = FxHashMap::default();
        unsafe {
            let uniform_count = context.get_active_uniforms(program);
            for num in 0..uniform_count {
                if let Some(info) = context.get_active_uniform(program, num) {
                    if let Some(location) = context.get_uniform_location(program, &info.name) {
                        uniforms.insert(info.name, location);
                    }
                }
            }
        }

        Ok(Program {
            context: Rc::clone(context),
            program,
            uniforms,
            features: features.to_vec(),
        })
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|known| *known == feature)
    }

    pub fn use_program(&self) {
        unsafe {
            self.context.use_program(Some(self.program));
        }
    }

    pub fn set_uniforms(&self, uniforms: &[&Uniform]) {
        self.use_program();

        for uniform in uniforms.iter() {
            self.set_uniform(uniform);
        }
    }

    // Uniforms that the compiler stripped out are skipped.
    fn set_uniform(&self, uniform: &Uniform) {
        let Some(location) = self.uniforms.get(uniform.name) else {
            return;
        };
        let context = &self.context;

        unsafe {
            match uniform.value {
                UniformValue::Float(value) => context.uniform_1_f32(Some(location), value),

                UniformValue::Vec2(value) => {
                    context.uniform_2_f32(Some(location), value[0], value[1])
                }

                UniformValue::Vec3(value) => {
                    context.uniform_3_f32(Some(location), value[0], value[1], value[2])
                }

                UniformValue::Texture2D(unit) => context.uniform_1_i32(Some(location), unit as i32),
            }
        }
    }
}

fn completeness(status: u32) -> Result<()> {
    if status == glow::FRAMEBUFFER_COMPLETE {
        Ok(())
    } else {
        Err(Problem::IncompleteFramebuffer(status))
    }
}

fn preprocess_shader<'a>(
    source: &'a str,
    optional_variables: Option<&[(&'static str, &str)]>,
) -> Cow<'a, str> {
    match optional_variables {
        Some(variables) if !variables.is_empty() => {
            let preamble = variables.iter().fold(String::new(), |vars, (name, value)| {
                vars + &format!("#define {} {}\n", name, value)
            });

            match source.split_once('\n') {
                Some((version, source_rest)) if version.starts_with("#version") => {
                    format!("{}\n{}{}", version, preamble, source_rest).into()
                }
                _ => (preamble + source).into(),
            }
        }
        _ => source.into(),
    }
}

pub struct Uniform<'a> {
    pub name: &'static str,
    pub value: UniformValue<'a>,
}

#[derive(Clone)]
pub enum UniformValue<'a> {
    Float(f32),
    Vec2(&'a [f32; 2]),
    Vec3(&'a [f32; 3]),
    Texture2D(u32),
}

pub fn compile_shader(context: &Context, shader_type: u32, source: &str) -> Result<glow::Shader> {
    unsafe {
        let shader = context
            .create_shader(shader_type)
            .map_err(|_| Problem::CannotCreateShader(None))?;
        context.shader_source(shader, source);
        context.compile_shader(shader);

        if context.get_shader_compile_status(shader) {
            Ok(shader)
        } else {
            let info = context.get_shader_info_log(shader);
            context.delete_shader(shader);
            Err(Problem::CannotCreateShader(Some(info)))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_complete_framebuffers_pass() {
        assert!(completeness(glow::FRAMEBUFFER_COMPLETE).is_ok());
        assert!(matches!(
            completeness(glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT),
            Err(Problem::IncompleteFramebuffer(glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT))
        ));
    }

    #[test]
    fn defines_are_inserted_after_the_version_line() {
        let source = "#version 100\nprecision highp float;\n";
        let defines: &[(&'static str, &str)] = &[("SHADING", "1")];
        let processed = preprocess_shader(source, Some(defines));

        assert_eq!(
            processed,
            "#version 100\n#define SHADING 1\nprecision highp float;\n"
        );
    }

    #[test]
    fn defines_are_prepended_without_a_version_line() {
        let source = "precision highp float;\n";
        let defines: &[(&'static str, &str)] = &[("MANUAL_FILTERING", "1")];
        let processed = preprocess_shader(source, Some(defines));

        assert_eq!(processed, "#define MANUAL_FILTERING 1\nprecision highp float;\n");
    }

    #[test]
    fn source_is_borrowed_without_defines() {
        let source = "#version 100\nvoid main() {}\n";

        assert!(matches!(preprocess_shader(source, None), Cow::Borrowed(_)));
        let defines: &[(&'static str, &str)] = &[];
        assert!(matches!(preprocess_shader(source, Some(defines)), Cow::Borrowed(_)));
    }
}
