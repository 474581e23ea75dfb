//! Windowed NDI ingest client.
//!
//! ## Mental model
//! - The core crate (`ndi_core`) owns discovery, receive, per-frame routing,
//!   render-convert and recording. This binary is plumbing: parse args, build
//!   a window + GL context, bind a `Surface` to it, and drive an event loop.
//! - The `Surface` this binary hands to the core is a CPU RGBA8 buffer; each
//!   redraw tick uploads whatever is dirty into a GL texture and presents it
//!   through `presenter::Presenter`, the same window/render-target split the
//!   rest of this codebase uses.
//! - Connection health (auto-reconnect) and recording are both driven from
//!   keyboard shortcuts and polled once per redraw tick; there's no secondary
//!   UI thread.
//! - Shortcuts: C connect, D disconnect, R toggle recording, O toggle OSD
//!   (video-info/bitrate logging), L list discovered sources, Esc/Q quit.
//!
//! ## Threads
//! - **Main thread**: owns the GL context, window, and event loop.
//! - **ndi-finder-poll**, **ndi-capture**, **ndi-decoder-\***,
//!   **ndi-recorder-writer**, **ndi-reconnect-timer**: owned by `ndi_core`.

mod logging;
mod presenter;
mod recordings;

use glow::HasContext;

use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, NotCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;

use raw_window_handle::HasRawWindowHandle;

use std::ffi::CString;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};

use ndi_core::assets::ConfigRoot;
use ndi_core::config::{load_receiver_config, Preferences};
use ndi_core::events::{ConnectionState, CoreEvent, LogLevel, RecordingState};
use ndi_core::finder::Finder;
use ndi_core::health::HealthPolicy;
use ndi_core::native::{CodecBackend, EncoderBackend, NdiRuntime, Surface};
use ndi_core::receiver::Receiver;
use ndi_core::recorder::Recorder;
use ndi_core::router::FrameRouter;
use ndi_core::source::{SourceDescriptor, SourceRepository};

use presenter::{NullPresenter, Presenter, WindowPresenter};

#[cfg(feature = "ndi")]
type Runtime = ndi_core::native::ndi_backend::NdiBackend;
#[cfg(not(feature = "ndi"))]
type Runtime = ndi_core::native::fake::FakeRuntime;

const VERT_SRC: &str = r#"#version 330 core
out vec2 v_uv;
void main() {
    vec2 pos;
    if (gl_VertexID == 0) pos = vec2(-1.0, -1.0);
    else if (gl_VertexID == 1) pos = vec2( 3.0, -1.0);
    else pos = vec2(-1.0,  3.0);
    v_uv = pos * 0.5 + 0.5;
    gl_Position = vec4(pos, 0.0, 1.0);
}"#;

const FRAG_SRC: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 frag_color;
uniform sampler2D u_tex;
uniform vec2 u_resolution;
uniform vec2 u_src_resolution;
uniform int u_scale_mode; // 0 = fit (letterbox), 1 = stretch

void main() {
    vec2 uv = v_uv;
    if (u_scale_mode == 0 && u_resolution.x > 0.0 && u_resolution.y > 0.0 && u_src_resolution.x > 0.0) {
        float win_aspect = u_resolution.x / u_resolution.y;
        float src_aspect = u_src_resolution.x / u_src_resolution.y;
        vec2 scale = vec2(1.0);
        if (win_aspect > src_aspect) {
            scale.x = src_aspect / win_aspect;
        } else {
            scale.y = win_aspect / src_aspect;
        }
        uv = (uv - 0.5) / scale + 0.5;
        if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0) {
            frag_color = vec4(0.0, 0.0, 0.0, 1.0);
            return;
        }
    }
    frag_color = texture(u_tex, uv);
}"#;

/// The display surface this binary hands to the core: a CPU RGBA8 buffer the
/// renderer/decoder write into, uploaded to a GL texture on the window
/// thread once per redraw tick.
struct GlSurface {
    width: AtomicU32,
    height: AtomicU32,
    buffer: Mutex<Vec<u8>>,
    dirty: AtomicBool,
}

impl GlSurface {
    fn new() -> Self {
        Self { width: AtomicU32::new(0), height: AtomicU32::new(0), buffer: Mutex::new(Vec::new()), dirty: AtomicBool::new(false) }
    }

    /// Takes a copy of the buffer iff it changed since the last call.
    fn snapshot_if_dirty(&self) -> Option<(u32, u32, Vec<u8>)> {
        if self.dirty.swap(false, Ordering::SeqCst) {
            let buf = self.buffer.lock().expect("gl surface buffer mutex poisoned").clone();
            Some((self.width.load(Ordering::SeqCst), self.height.load(Ordering::SeqCst), buf))
        } else {
            None
        }
    }
}

impl Surface for GlSurface {
    fn lock_canvas(&self, width: u32, height: u32) -> Option<&mut [u8]> {
        let mut buf = self.buffer.lock().expect("gl surface buffer mutex poisoned");
        let needed = (width as usize) * (height as usize) * 4;
        if buf.len() != needed {
            buf.resize(needed, 0);
        }
        self.width.store(width, Ordering::SeqCst);
        self.height.store(height, Ordering::SeqCst);
        let ptr = buf.as_mut_ptr();
        let len = buf.len();
        Some(unsafe { std::slice::from_raw_parts_mut(ptr, len) })
    }

    fn unlock(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn width(&self) -> u32 {
        self.width.load(Ordering::SeqCst)
    }

    fn height(&self) -> u32 {
        self.height.load(Ordering::SeqCst)
    }
}

struct VideoTexture {
    tex: glow::NativeTexture,
    w: i32,
    h: i32,
}

unsafe fn create_video_texture(gl: &glow::Context) -> VideoTexture {
    let tex = gl.create_texture().expect("create_texture failed");
    gl.bind_texture(glow::TEXTURE_2D, Some(tex));
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
    gl.bind_texture(glow::TEXTURE_2D, None);
    VideoTexture { tex, w: 0, h: 0 }
}

unsafe fn upload_video_frame(gl: &glow::Context, vt: &mut VideoTexture, width: i32, height: i32, rgba: &[u8]) {
    gl.bind_texture(glow::TEXTURE_2D, Some(vt.tex));
    if vt.w != width || vt.h != height {
        gl.tex_image_2d(glow::TEXTURE_2D, 0, glow::RGBA as i32, width, height, 0, glow::RGBA, glow::UNSIGNED_BYTE, glow::PixelUnpackData::Slice(Some(rgba)));
        vt.w = width;
        vt.h = height;
    } else {
        gl.tex_sub_image_2d(glow::TEXTURE_2D, 0, 0, 0, width, height, glow::RGBA, glow::UNSIGNED_BYTE, glow::PixelUnpackData::Slice(Some(rgba)));
    }
    gl.bind_texture(glow::TEXTURE_2D, None);
}

unsafe fn compile_program(gl: &glow::Context, vert_src: &str, frag_src: &str) -> glow::NativeProgram {
    let vs = gl.create_shader(glow::VERTEX_SHADER).expect("create_shader failed");
    gl.shader_source(vs, vert_src);
    gl.compile_shader(vs);
    if !gl.get_shader_compile_status(vs) {
        panic!("Vertex shader compile error:\n{}", gl.get_shader_info_log(vs));
    }

    let fs = gl.create_shader(glow::FRAGMENT_SHADER).expect("create_shader failed");
    gl.shader_source(fs, frag_src);
    gl.compile_shader(fs);
    if !gl.get_shader_compile_status(fs) {
        panic!("Fragment shader compile error:\n{}", gl.get_shader_info_log(fs));
    }

    let program = gl.create_program().expect("create_program failed");
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);
    if !gl.get_program_link_status(program) {
        panic!("Program link error:\n{}", gl.get_program_info_log(program));
    }

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    program
}

fn set_u_resolution(gl: &glow::Context, program: glow::NativeProgram, w: i32, h: i32) {
    unsafe {
        if let Some(loc) = gl.get_uniform_location(program, "u_resolution") {
            gl.uniform_2_f32(Some(&loc), w as f32, h as f32);
        }
    }
}

fn set_u_src_resolution(gl: &glow::Context, program: glow::NativeProgram, w: i32, h: i32) {
    unsafe {
        if let Some(loc) = gl.get_uniform_location(program, "u_src_resolution") {
            gl.uniform_2_f32(Some(&loc), w as f32, h as f32);
        }
    }
}

fn set_u_scale_mode(gl: &glow::Context, program: glow::NativeProgram, mode: i32) {
    unsafe {
        if let Some(loc) = gl.get_uniform_location(program, "u_scale_mode") {
            gl.uniform_1_i32(Some(&loc), mode);
        }
    }
}

fn decoder_backend_factory() -> Box<dyn Fn() -> Box<dyn CodecBackend> + Send + Sync> {
    #[cfg(feature = "openh264")]
    {
        Box::new(|| Box::new(ndi_core::decoder_openh264::Openh264Decoder::default()) as Box<dyn CodecBackend>)
    }
    #[cfg(not(feature = "openh264"))]
    {
        Box::new(|| -> Box<dyn CodecBackend> { panic!("no decoder backend wired; build with feature `openh264` or provide a hardware backend") })
    }
}

fn encoder_backend_factory() -> Box<dyn Fn() -> Box<dyn EncoderBackend> + Send + Sync> {
    #[cfg(feature = "openh264")]
    {
        Box::new(|| Box::new(ndi_core::decoder_openh264::Openh264Encoder::default()) as Box<dyn EncoderBackend>)
    }
    #[cfg(not(feature = "openh264"))]
    {
        Box::new(|| -> Box<dyn EncoderBackend> { panic!("no encoder backend wired; build with feature `openh264` or provide a hardware backend") })
    }
}

struct Args {
    source: Option<String>,
    no_auto_reconnect: bool,
    record: bool,
    headless: bool,
    list: bool,
    list_recordings: bool,
    log_file: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = Args {
        source: None,
        no_auto_reconnect: false,
        record: false,
        headless: false,
        list: false,
        list_recordings: false,
        log_file: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--source" => args.source = it.next(),
            "--no-auto-reconnect" => args.no_auto_reconnect = true,
            "--record" => args.record = true,
            "--headless" => args.headless = true,
            "--list" => args.list = true,
            "--list-recordings" => args.list_recordings = true,
            "--log-file" => args.log_file = it.next().map(PathBuf::from),
            other => eprintln!("ignoring unrecognized argument: {other}"),
        }
    }
    args
}

/// Shared handles the event loop and keyboard shortcuts act on.
struct App {
    runtime: Arc<Runtime>,
    receiver: Arc<Mutex<Receiver<Runtime>>>,
    router: Arc<FrameRouter<Runtime>>,
    recorder: Arc<Recorder>,
    health: Arc<HealthPolicy>,
    repo: SourceRepository,
    prefs: Arc<Mutex<Preferences>>,
    config_root: ConfigRoot,
    last_source: Mutex<Option<SourceDescriptor>>,
    show_osd: AtomicBool,
}

impl App {
    fn connect(&self, source: SourceDescriptor) {
        logi!("CONNECT", "connecting to {}", source.name);
        self.receiver.lock().expect("receiver mutex poisoned").connect(source.clone());
        let connected = matches!(self.receiver.lock().expect("receiver mutex poisoned").state(), ConnectionState::Connected(_));
        if connected {
            self.health.note_connected(&self.prefs, &source);
            *self.last_source.lock().expect("last-source mutex poisoned") = Some(source.clone());
            logi!("CONNECT", "connected to {}", source.name);
            if let Ok(prefs) = self.prefs.lock() {
                let _ = prefs.save(&self.config_root);
            }
        } else {
            logw!("CONNECT", "failed to connect to {}", source.name);
        }
    }

    fn disconnect(&self) {
        self.receiver.lock().expect("receiver mutex poisoned").disconnect();
        self.stop_recording_on_outage();
        logi!("CONNECT", "disconnected");
    }

    /// A stream stops recording when its source goes away:
    /// there is nothing left to write once the connection is Error or
    /// Disconnected.
    fn stop_recording_on_outage(&self) {
        if self.recorder.is_recording() {
            self.router.stop_recording();
            logi!("RECORDER", "stopped: connection lost");
        }
    }

    fn toggle_recording(&self) {
        if self.recorder.is_recording() {
            self.router.stop_recording();
            logi!("RECORDER", "stop requested");
        } else {
            match self.router.start_recording() {
                Ok(()) => logi!("RECORDER", "start requested"),
                Err(e) => logw!("RECORDER", "could not start recording: {e}"),
            }
        }
    }

    /// Toggles whether video-info/bitrate text is logged.
    /// This CLI has no text overlay to draw, so the OSD surfaces as log lines.
    fn toggle_osd(&self) {
        let now = !self.show_osd.load(Ordering::SeqCst);
        self.show_osd.store(now, Ordering::SeqCst);
        logi!("OSD", "{}", if now { "shown" } else { "hidden" });
        let mut prefs = self.prefs.lock().expect("preferences mutex poisoned");
        prefs.show_osd = now;
        let _ = prefs.save(&self.config_root);
    }

    /// Poll for a connection-lost declaration and, if one fired, hand the
    /// outage to the health policy for the last-known source.
    fn poll_health(&self) {
        let lost = self.receiver.lock().expect("receiver mutex poisoned").poll_connection_lost();
        if lost {
            logw!("CONNECT", "connection lost");
            self.stop_recording_on_outage();
            if let Some(source) = self.last_source.lock().expect("last-source mutex poisoned").clone() {
                self.health.on_connection_error(self.receiver.clone(), source);
            }
        }
    }
}

fn log_core_event(ev: CoreEvent, show_osd: bool) {
    match ev {
        CoreEvent::Log { level, tag, msg } => match level {
            LogLevel::Trace | LogLevel::Debug | LogLevel::Info => logi!(tag, "{msg}"),
            LogLevel::Warn => logw!(tag, "{msg}"),
            LogLevel::Error => loge!(tag, "{msg}"),
        },
        CoreEvent::DiscoverySnapshot(sources) => {
            logi!("DISCOVERY", "{} source(s): {}", sources.len(), sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", "));
        }
        CoreEvent::ConnectionChanged(state) => logi!("CONNECT", "state -> {state:?}"),
        CoreEvent::RecordingChanged(state) => match state {
            RecordingState::Idle => logi!("RECORDER", "idle"),
            RecordingState::Recording { .. } => logi!("RECORDER", "recording"),
            RecordingState::Stopped { file } => logi!("RECORDER", "stopped, wrote {:?}", file),
            RecordingState::Error(e) => loge!("RECORDER", "{e}"),
        },
        // OSD text: only surfaced when show_osd is on.
        CoreEvent::VideoInfoChanged(digest) => {
            if show_osd {
                logi!("VIDEO", "{digest}");
            }
        }
        CoreEvent::BitrateChanged(label) => {
            if show_osd {
                logi!("VIDEO", "bitrate: {label}");
            }
        }
        CoreEvent::ReconnectAttempt { attempt, max_attempts } => {
            logi!("CONNECT", "reconnect attempt {attempt}/{max_attempts}")
        }
    }
}

fn main() {
    let args = parse_args();
    let run_id = logging::init(args.log_file.clone());
    logi!("INIT", "run_id={run_id}");

    if args.list_recordings {
        let root = ConfigRoot::discover_or_default(&std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        recordings::print_recordings(&root.recordings_dir());
        return;
    }

    let config_root = ConfigRoot::discover_or_default(&std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let prefs = Preferences::load(&config_root).unwrap_or_else(|e| {
        logw!("CONFIG", "failed to load preferences, using defaults: {e}");
        Preferences::default()
    });
    let receiver_cfg = load_receiver_config(&config_root);

    let runtime = Arc::new(Runtime::default());
    if !runtime.initialize() {
        loge!("INIT", "failed to initialize the NDI runtime");
        std::process::exit(1);
    }
    logi!("INIT", "runtime: {}", runtime.version());

    let (event_tx, event_rx) = crossbeam_channel::unbounded::<CoreEvent>();

    let router = Arc::new(FrameRouter::new(runtime.clone(), event_tx.clone(), decoder_backend_factory()));
    let recorder = Arc::new(Recorder::new(event_tx.clone(), config_root.recordings_dir(), encoder_backend_factory()));
    router.set_recorder(Some(recorder.clone()));

    let receiver = Arc::new(Mutex::new(Receiver::new(runtime.clone(), receiver_cfg, router.clone())));
    let health = Arc::new(HealthPolicy::new(event_tx.clone(), prefs.auto_reconnect && !args.no_auto_reconnect));

    let repo = SourceRepository::new();
    let mut finder = Finder::new(runtime.clone(), repo.clone());
    finder.start_discovery().expect("failed to start discovery");

    let show_osd = prefs.show_osd;
    let app = Arc::new(App {
        runtime: runtime.clone(),
        receiver: receiver.clone(),
        router: router.clone(),
        recorder: recorder.clone(),
        health: health.clone(),
        repo: repo.clone(),
        prefs: Arc::new(Mutex::new(prefs)),
        config_root: config_root.clone(),
        last_source: Mutex::new(None),
        show_osd: AtomicBool::new(show_osd),
    });

    if args.list {
        std::thread::sleep(Duration::from_millis(1500));
        let sources = repo.snapshot();
        if sources.is_empty() {
            println!("no sources found");
        } else {
            for s in &sources {
                println!("{}", s.name);
            }
        }
        finder.stop_discovery();
        runtime.destroy();
        return;
    }

    if let Some(name) = &args.source {
        let url = repo.find(name).and_then(|s| s.url);
        app.connect(SourceDescriptor::new(name.clone(), url));
        if args.record {
            app.toggle_recording();
        }
    }

    let event_loop = EventLoop::new().expect("EventLoop::new failed");

    let window_builder = winit::window::WindowBuilder::new().with_title("ndi-ingest").with_inner_size(PhysicalSize::new(1280, 720));

    let template = ConfigTemplateBuilder::new().with_alpha_size(8).with_depth_size(0);
    let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

    let (window, gl_config) = display_builder
        .build(&event_loop, template, |configs| configs.reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b }).unwrap())
        .expect("failed to build display");

    let window = window.expect("no window created");

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();

    let context_attributes =
        ContextAttributesBuilder::new().with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3)))).build(Some(raw_window_handle));

    let not_current_gl_context: NotCurrentContext =
        unsafe { gl_display.create_context(&gl_config, &context_attributes).expect("create_context failed") };

    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        window.raw_window_handle(),
        NonZeroU32::new(1280).unwrap(),
        NonZeroU32::new(720).unwrap(),
    );

    let gl_surface = unsafe { gl_display.create_window_surface(&gl_config, &attrs).expect("create_window_surface failed") };

    let gl_context = not_current_gl_context.make_current(&gl_surface).expect("make_current failed");

    gl_surface.set_swap_interval(&gl_context, SwapInterval::Wait(NonZeroU32::new(1).unwrap())).ok();

    let gl = unsafe { glow::Context::from_loader_function(|s| gl_display.get_proc_address(&CString::new(s).unwrap()) as *const _) };

    let program = unsafe { compile_program(&gl, VERT_SRC, FRAG_SRC) };
    let vao = unsafe { gl.create_vertex_array().expect("create_vertex_array failed") };
    let mut video_tex = unsafe { create_video_texture(&gl) };

    let gl_surface_handle = Arc::new(GlSurface::new());
    let surface: Arc<dyn Surface> = gl_surface_handle.clone();
    router.set_surface(Some(surface));

    let mut presenter: Presenter = if args.headless { Presenter::Null(NullPresenter::default()) } else { Presenter::Window(WindowPresenter { vao }) };
    if !presenter.is_enabled() {
        window.set_visible(false);
    }

    let preview_scale_mode: i32 = 0;
    let health_poll_interval = Duration::from_millis(250);
    let mut last_health_poll = Instant::now();

    logi!("INIT", "ready (run_id={})", logging::run_id());
    window.set_title("ndi-ingest — C connect, D disconnect, R record, O toggle OSD, L list sources, Esc quit");

    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => target.exit(),

                    WindowEvent::Resized(new_size) => {
                        let w = new_size.width.max(1);
                        let h = new_size.height.max(1);
                        presenter.resize_window_surface(&gl_context, &gl_surface, w, h, |surf, ctx, ww, hh| unsafe {
                            surf.resize(ctx, NonZeroU32::new(ww).unwrap(), NonZeroU32::new(hh).unwrap());
                        });
                        window.request_redraw();
                    }

                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state.is_pressed() && !event.repeat {
                            if let PhysicalKey::Code(code) = event.physical_key {
                                match code {
                                    KeyCode::Escape | KeyCode::KeyQ => target.exit(),
                                    KeyCode::KeyC => {
                                        let sources = app.repo.snapshot();
                                        if let Some(first) = sources.into_iter().next() {
                                            app.connect(first);
                                        } else if let Some(last) = app.last_source.lock().expect("last-source mutex poisoned").clone() {
                                            app.connect(last);
                                        } else {
                                            logw!("CONNECT", "no sources discovered yet");
                                        }
                                    }
                                    KeyCode::KeyD => app.disconnect(),
                                    KeyCode::KeyR => app.toggle_recording(),
                                    KeyCode::KeyO => app.toggle_osd(),
                                    KeyCode::KeyL => {
                                        let sources = app.repo.snapshot();
                                        logi!("DISCOVERY", "{} source(s): {}", sources.len(), sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", "));
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }

                    WindowEvent::RedrawRequested => unsafe {
                        if let Some((w, h, rgba)) = gl_surface_handle.snapshot_if_dirty() {
                            if w > 0 && h > 0 {
                                upload_video_frame(&gl, &mut video_tex, w as i32, h as i32, &rgba);
                            }
                        }

                        let win_size = window.inner_size();
                        presenter.present(
                            &gl,
                            program,
                            video_tex.tex,
                            video_tex.w.max(1),
                            video_tex.h.max(1),
                            win_size.width as i32,
                            win_size.height as i32,
                            preview_scale_mode,
                            &gl_context,
                            &gl_surface,
                            |surf, ctx| {
                                surf.swap_buffers(ctx).expect("swap_buffers failed");
                            },
                            set_u_resolution,
                            set_u_src_resolution,
                            set_u_scale_mode,
                        );
                    },

                    _ => {}
                },

                Event::AboutToWait => {
                    if last_health_poll.elapsed() >= health_poll_interval {
                        app.poll_health();
                        last_health_poll = Instant::now();
                    }
                    let show_osd = app.show_osd.load(Ordering::SeqCst);
                    while let Ok(ev) = event_rx.try_recv() {
                        log_core_event(ev, show_osd);
                    }
                    window.request_redraw();
                }

                Event::LoopExiting => {
                    finder.stop_discovery();
                    app.recorder.stop_recording();
                    app.receiver.lock().expect("receiver mutex poisoned").disconnect();
                    app.runtime.destroy();
                }

                _ => {}
            }
        })
        .expect("event loop run failed");
}
