use plume::settings::Settings;
use plume::{Capabilities, ContextVersion, GlBackend, Host, Size};

use gloo_utils::format::JsValueSerdeExt;
use glow::HasContext;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{AddEventListenerOptions, Event, HtmlCanvasElement, MouseEvent, TouchEvent, Window};

type Instance = plume::Plume<GlBackend, BrowserHost>;
type Slot = Rc<RefCell<Option<Instance>>>;

/// The handle returned to the page.
#[wasm_bindgen]
pub struct Plume {
    instance: Slot,
}

#[wasm_bindgen]
impl Plume {
    pub fn pause(&self) {
        self.with_instance(Instance::pause);
    }

    pub fn resume(&self) {
        self.with_instance(Instance::resume);
    }

    /// Stop the animation and remove the input listeners. The handle can't
    /// be restarted afterwards.
    pub fn destroy(&self) {
        self.with_instance(Instance::destroy);
    }

    fn with_instance(&self, f: impl FnOnce(&mut Instance)) {
        if let Ok(mut slot) = self.instance.try_borrow_mut() {
            if let Some(instance) = slot.as_mut() {
                f(instance);
            }
        }
    }
}

impl Drop for Plume {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Start the effect on `canvas`. `settings` is a partial settings object.
/// Missing keys take their defaults.
#[wasm_bindgen]
pub fn create(canvas: HtmlCanvasElement, settings: &JsValue) -> Result<Plume, JsValue> {
    set_panic_hook();
    // Already set up by an earlier instance.
    let _ = console_log::init_with_level(log::Level::Debug);

    let settings = read_settings(settings).map_err(|err| JsValue::from_str(&err.to_string()))?;
    let window = window()?;

    let (gl, version) = get_rendering_context(&canvas)?;
    let context = Rc::new(gl);
    unsafe {
        context.disable(glow::BLEND);
        context.disable(glow::DEPTH_TEST);
    }

    let capabilities = Capabilities::probe(&context, version);
    let backend = GlBackend::new(&context, capabilities)
        .map_err(|err| JsValue::from_str(&err.to_string()))?;

    let slot: Slot = Rc::new(RefCell::new(None));
    let host = BrowserHost::new(window, canvas, Rc::downgrade(&slot));

    let mut instance = plume::Plume::new(backend, host, settings)
        .map_err(|err| JsValue::from_str(&err.to_string()))?;

    if let Err(err) = instance.host_mut().attach_input(&slot) {
        instance.destroy();
        return Err(err);
    }

    *slot.borrow_mut() = Some(instance);

    Ok(Plume { instance: slot })
}

fn read_settings(settings: &JsValue) -> Result<Settings, plume::Problem> {
    if settings.is_undefined() || settings.is_null() {
        return Ok(Settings::default());
    }

    settings
        .into_serde()
        .map_err(|err| plume::Problem::ReadSettings(err.to_string()))
}

struct Listener {
    event: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

struct BrowserHost {
    window: Window,
    canvas: HtmlCanvasElement,
    frame_callback: Closure<dyn FnMut(f64)>,
    listeners: Vec<Listener>,
}

impl BrowserHost {
    fn new(
        window: Window,
        canvas: HtmlCanvasElement,
        instance: Weak<RefCell<Option<Instance>>>,
    ) -> Self {
        let frame_callback = Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
            let Some(slot) = instance.upgrade() else {
                return;
            };
            if let Ok(mut slot) = slot.try_borrow_mut() {
                if let Some(instance) = slot.as_mut() {
                    instance.animate(timestamp);
                }
            };
        });

        Self {
            window,
            canvas,
            frame_callback,
            listeners: Vec::new(),
        }
    }

    fn attach_input(&mut self, slot: &Slot) -> Result<(), JsValue> {
        let handlers: [(&'static str, fn(&mut Instance, &Event, f64)); 6] = [
            ("mousedown", |instance, event, ratio| {
                if let Some(event) = event.dyn_ref::<MouseEvent>() {
                    let (x, y) = mouse_position(event, ratio);
                    instance.pointer_down(plume::pointer::MOUSE, x, y);
                    instance.click();
                }
            }),
            ("mousemove", |instance, event, ratio| {
                if let Some(event) = event.dyn_ref::<MouseEvent>() {
                    let (x, y) = mouse_position(event, ratio);
                    instance.pointer_move(plume::pointer::MOUSE, x, y);
                }
            }),
            ("mouseup", |instance, _, _| {
                instance.pointer_up(plume::pointer::MOUSE);
            }),
            ("touchstart", |instance, event, ratio| {
                for (id, x, y) in touches(event, ratio, TouchEvent::target_touches) {
                    instance.pointer_down(id, x, y);
                }
            }),
            ("touchmove", |instance, event, ratio| {
                for (id, x, y) in touches(event, ratio, TouchEvent::target_touches) {
                    instance.pointer_move(id, x, y);
                }
            }),
            ("touchend", |instance, event, ratio| {
                for (id, _, _) in touches(event, ratio, TouchEvent::changed_touches) {
                    instance.pointer_up(id);
                }
            }),
        ];

        for (event, handler) in handlers {
            let listener = listen(&self.window, event, Rc::downgrade(slot), handler)?;
            self.listeners.push(listener);
        }

        Ok(())
    }
}

impl Host for BrowserHost {
    type FrameHandle = Option<i32>;

    fn now(&self) -> f64 {
        self.window
            .performance()
            .map_or(0.0, |performance| performance.now())
    }

    fn resize_surface(&mut self) -> Size {
        let ratio = self.window.device_pixel_ratio();
        let (width, height) = match (self.canvas.client_width(), self.canvas.client_height()) {
            (0, _) | (_, 0) => (self.canvas.width(), self.canvas.height()),
            (width, height) => (scale(width, ratio), scale(height, ratio)),
        };

        if self.canvas.width() != width || self.canvas.height() != height {
            self.canvas.set_width(width);
            self.canvas.set_height(height);
        }

        Size::new(width, height)
    }

    fn request_frame(&mut self) -> Option<i32> {
        match self
            .window
            .request_animation_frame(self.frame_callback.as_ref().unchecked_ref())
        {
            Ok(id) => Some(id),
            Err(err) => {
                log::error!("Can’t request an animation frame: {:?}", err);
                None
            }
        }
    }

    fn cancel_frame(&mut self, handle: Option<i32>) {
        if let Some(id) = handle {
            if let Err(err) = self.window.cancel_animation_frame(id) {
                log::error!("Can’t cancel the animation frame: {:?}", err);
            }
        }
    }

    fn detach_input(&mut self) {
        for listener in self.listeners.drain(..) {
            let removed = self.window.remove_event_listener_with_callback(
                listener.event,
                listener.callback.as_ref().unchecked_ref(),
            );
            if let Err(err) = removed {
                log::error!("Can’t remove the {} listener: {:?}", listener.event, err);
            }
        }
    }
}

fn listen(
    window: &Window,
    event: &'static str,
    instance: Weak<RefCell<Option<Instance>>>,
    handler: fn(&mut Instance, &Event, f64),
) -> Result<Listener, JsValue> {
    let ratio_source = window.clone();
    let callback = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        let Some(slot) = instance.upgrade() else {
            return;
        };
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if let Some(instance) = slot.as_mut() {
                handler(instance, &event, ratio_source.device_pixel_ratio());
            }
        };
    });

    let options = AddEventListenerOptions::new();
    options.set_passive(true);
    window.add_event_listener_with_callback_and_add_event_listener_options(
        event,
        callback.as_ref().unchecked_ref(),
        &options,
    )?;

    Ok(Listener { event, callback })
}

fn scale(css_pixels: i32, ratio: f64) -> u32 {
    (f64::from(css_pixels) * ratio).floor() as u32
}

fn mouse_position(event: &MouseEvent, ratio: f64) -> (f32, f32) {
    (
        scale(event.client_x(), ratio) as f32,
        scale(event.client_y(), ratio) as f32,
    )
}

fn touches(
    event: &Event,
    ratio: f64,
    list: fn(&TouchEvent) -> web_sys::TouchList,
) -> Vec<(i64, f32, f32)> {
    let Some(event) = event.dyn_ref::<TouchEvent>() else {
        return Vec::new();
    };
    let touches = list(event);

    (0..touches.length())
        .filter_map(|index| touches.get(index))
        .map(|touch| {
            (
                i64::from(touch.identifier()),
                scale(touch.client_x(), ratio) as f32,
                scale(touch.client_y(), ratio) as f32,
            )
        })
        .collect()
}

pub fn get_rendering_context(
    canvas: &HtmlCanvasElement,
) -> Result<(glow::Context, ContextVersion), JsValue> {
    use web_sys::{WebGl2RenderingContext, WebGlRenderingContext};

    let options = ContextOptions {
        alpha: true,
        depth: false,
        stencil: false,
        antialias: false,
        premultiplied_alpha: true,
        preserve_drawing_buffer: false,
    }
    .serialize()?;

    if let Some(gl) = get_context(canvas, "webgl2", &options) {
        let gl = gl.dyn_into::<WebGl2RenderingContext>()?;
        for extension in ContextVersion::WebGl2.extensions() {
            gl.get_extension(extension)?;
        }

        return Ok((
            glow::Context::from_webgl2_context(gl),
            ContextVersion::WebGl2,
        ));
    }

    for context_id in ["webgl", "experimental-webgl"] {
        if let Some(gl) = get_context(canvas, context_id, &options) {
            let gl = gl.dyn_into::<WebGlRenderingContext>()?;
            for extension in ContextVersion::WebGl1.extensions() {
                gl.get_extension(extension)?;
            }

            return Ok((
                glow::Context::from_webgl1_context(gl),
                ContextVersion::WebGl1,
            ));
        }
    }

    Err(JsValue::from_str("Unable to initialize WebGL"))
}

fn get_context(
    canvas: &HtmlCanvasElement,
    context_id: &str,
    options: &JsValue,
) -> Option<js_sys::Object> {
    canvas
        .get_context_with_context_options(context_id, options)
        .ok()
        .flatten()
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
    pub antialias: bool,
    pub premultiplied_alpha: bool,
    pub preserve_drawing_buffer: bool,
}

impl ContextOptions {
    pub fn serialize(&self) -> Result<JsValue, JsValue> {
        JsValue::from_serde(self).map_err(|err| JsValue::from_str(&err.to_string()))
    }
}

pub fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("The global `window` doesn’t exist"))
}

// https://github.com/rustwasm/console_error_panic_hook#readme
pub fn set_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
