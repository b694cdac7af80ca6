use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{
    self as term, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
    Event, KeyCode as TermKeyCode, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    MouseButton as TermMouseButton, MouseEventKind, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::terminal::{
    self, BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use thiserror::Error;

use crate::error::{EngineError, Result};
use crate::event::{
    InputEvent, KeyAction, KeyCode, KeyEvent, Modifiers, MouseAction, MouseButton, MouseEvent,
    WindowSize,
};
use crate::hooks::{Extension, HookContext, HookKind};
use crate::render::Renderer;
use crate::runtime::{RuntimeHandle, SketchRuntime};

pub type DriverResult<T> = std::result::Result<T, TerminalDriverError>;

#[derive(Debug, Error)]
pub enum TerminalDriverError {
    #[error("runtime error: {0}")]
    Runtime(#[from] EngineError),
    #[error("terminal error: {0}")]
    Terminal(String),
    #[error("input thread stopped unexpectedly")]
    InputThread,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Runs a sketch in the terminal: raw mode, alternate screen, mouse and
/// focus reporting. A producer thread feeds crossterm events to the runtime
/// through its handle.
pub struct TerminalDriver<M> {
    runtime: SketchRuntime<M>,
    poll_interval: Duration,
}

impl<M> TerminalDriver<M> {
    pub fn new(runtime: SketchRuntime<M>) -> Self {
        Self {
            runtime,
            poll_interval: Duration::from_millis(25),
        }
    }

    /// How long the input thread blocks in one poll before checking for shutdown.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until the sketch exits and hand the runtime back.
    pub fn run(mut self) -> DriverResult<SketchRuntime<M>> {
        let guard = Arc::new(TerminalGuard::enter(&mut io::stdout())?);
        // Restores the terminal from the dispose hook as well, which runs
        // before any process-level exit.
        self.runtime.install(TerminalRestore {
            guard: Arc::clone(&guard),
        });
        let result = self.run_inner(guard.keyboard_enhanced);
        guard.restore();
        result.map(|_| self.runtime)
    }

    fn run_inner(&mut self, keyboard_enhanced: bool) -> DriverResult<()> {
        let (width, height) = terminal::size()?;
        self.runtime
            .post_window_resized(u32::from(width), u32::from(height));

        let handle = self.runtime.handle();
        let stop = Arc::new(AtomicBool::new(false));
        let producer = {
            let stop = Arc::clone(&stop);
            let poll = self.poll_interval;
            thread::Builder::new()
                .name("sketch-input".to_string())
                .spawn(move || pump_input(handle, &stop, poll, keyboard_enhanced))?
        };

        let outcome = self.runtime.run();
        stop.store(true, Ordering::Release);
        let pumped = producer
            .join()
            .map_err(|_| TerminalDriverError::InputThread)?;
        outcome?;
        pumped?;
        Ok(())
    }
}

/// Terminal modes set up by the driver, restored exactly once.
struct TerminalGuard {
    active: AtomicBool,
    /// The terminal reports key releases and repeats. Without the keyboard
    /// enhancement protocol only presses arrive.
    keyboard_enhanced: bool,
}

impl TerminalGuard {
    fn enter(stdout: &mut impl Write) -> DriverResult<Self> {
        terminal::enable_raw_mode()
            .map_err(|err| TerminalDriverError::Terminal(err.to_string()))?;
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableFocusChange,
            Hide,
            Clear(ClearType::All)
        )?;
        let keyboard_enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if keyboard_enhanced {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                )
            )?;
        }
        Ok(Self {
            active: AtomicBool::new(true),
            keyboard_enhanced,
        })
    }

    fn restore(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut stdout = io::stdout();
        if self.keyboard_enhanced {
            execute!(stdout, PopKeyboardEnhancementFlags).ok();
        }
        execute!(
            stdout,
            DisableFocusChange,
            DisableMouseCapture,
            Show,
            LeaveAlternateScreen
        )
        .ok();
        terminal::disable_raw_mode().ok();
    }
}

fn pump_input(
    handle: RuntimeHandle,
    stop: &AtomicBool,
    poll: Duration,
    keyboard_enhanced: bool,
) -> io::Result<()> {
    let mut translator = CrosstermTranslator::new().synthesize_key_releases(!keyboard_enhanced);
    while !stop.load(Ordering::Acquire) && !handle.is_disposed() {
        if !term::poll(poll)? {
            continue;
        }
        for event in translator.translate(term::read()?) {
            match event {
                SurfaceEvent::Input(input) => handle.post_event(input),
                SurfaceEvent::Resized { width, height } => {
                    handle.post_window_resized(width, height);
                    handle.redraw();
                }
            }
        }
    }
    Ok(())
}

/// Leaves the alternate screen when the runtime is disposed.
struct TerminalRestore {
    guard: Arc<TerminalGuard>,
}

impl Extension for TerminalRestore {
    fn name(&self) -> &str {
        "driver.terminal_restore"
    }

    fn capabilities(&self) -> &[HookKind] {
        &[HookKind::Dispose]
    }

    fn dispose(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        self.guard.restore();
        Ok(())
    }
}

/// Wraps each frame in a synchronized update so partial frames never show.
pub struct TerminalRenderer<W: Write + Send> {
    out: W,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn begin_frame(&mut self, _frame: u64) -> Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        queue!(self.out, EndSynchronizedUpdate)?;
        self.out.flush()?;
        Ok(())
    }

    fn resize(&mut self, _size: WindowSize) -> Result<()> {
        queue!(self.out, Clear(ClearType::All))?;
        Ok(())
    }
}

/// What the surface hands to the runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceEvent {
    Input(InputEvent),
    Resized { width: u32, height: u32 },
}

/// Turns crossterm events into engine events.
///
/// Terminals report no click or typed events, so a release without an
/// intervening drag is followed by `Click`, and printable key presses are
/// followed by `Type`.
#[derive(Debug, Default)]
pub struct CrosstermTranslator {
    dragged: bool,
    synthesize_key_releases: bool,
}

impl CrosstermTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow every key press with a release. For terminals without the
    /// keyboard enhancement protocol, which never report releases; the
    /// pressed-key set would otherwise only grow.
    pub fn synthesize_key_releases(mut self, enabled: bool) -> Self {
        self.synthesize_key_releases = enabled;
        self
    }

    pub fn translate(&mut self, event: Event) -> Vec<SurfaceEvent> {
        match event {
            Event::Key(key) => translate_key(key, self.synthesize_key_releases),
            Event::Mouse(mouse) => self.translate_mouse(mouse),
            Event::Resize(width, height) => vec![SurfaceEvent::Resized {
                width: u32::from(width),
                height: u32::from(height),
            }],
            Event::FocusGained => vec![SurfaceEvent::Input(InputEvent::Focus { gained: true })],
            Event::FocusLost => vec![SurfaceEvent::Input(InputEvent::Focus { gained: false })],
            Event::Paste(text) => text
                .chars()
                .map(|ch| SurfaceEvent::Input(KeyEvent::typed(ch).into()))
                .collect(),
        }
    }

    fn translate_mouse(&mut self, mouse: term::MouseEvent) -> Vec<SurfaceEvent> {
        let x = f32::from(mouse.column);
        let y = f32::from(mouse.row);
        let modifiers = modifiers(mouse.modifiers);
        let event = |action, button| {
            SurfaceEvent::Input(
                MouseEvent::new(action, x, y)
                    .with_button(button)
                    .with_modifiers(modifiers)
                    .into(),
            )
        };

        match mouse.kind {
            MouseEventKind::Down(button) => {
                self.dragged = false;
                vec![event(MouseAction::Press, mouse_button(button)).with_count(1)]
            }
            MouseEventKind::Up(button) => {
                let button = mouse_button(button);
                let mut events = vec![event(MouseAction::Release, button).with_count(1)];
                if !self.dragged {
                    events.push(event(MouseAction::Click, button).with_count(1));
                }
                self.dragged = false;
                events
            }
            MouseEventKind::Drag(button) => {
                self.dragged = true;
                vec![event(MouseAction::Drag, mouse_button(button))]
            }
            MouseEventKind::Moved => vec![event(MouseAction::Move, MouseButton::None)],
            MouseEventKind::ScrollDown => {
                vec![event(MouseAction::Wheel, MouseButton::None).with_count(1)]
            }
            MouseEventKind::ScrollUp => {
                vec![event(MouseAction::Wheel, MouseButton::None).with_count(-1)]
            }
            MouseEventKind::ScrollLeft | MouseEventKind::ScrollRight => Vec::new(),
        }
    }
}

impl SurfaceEvent {
    fn with_count(self, count: i32) -> Self {
        match self {
            SurfaceEvent::Input(InputEvent::Mouse(mouse)) => {
                SurfaceEvent::Input(InputEvent::Mouse(mouse.with_count(count)))
            }
            other => other,
        }
    }
}

fn translate_key(key: term::KeyEvent, synthesize_release: bool) -> Vec<SurfaceEvent> {
    let (ch, code) = match key.code {
        TermKeyCode::Char(ch) => (Some(ch), KeyCode::from_char(ch)),
        TermKeyCode::Enter => (Some('\n'), KeyCode::ENTER),
        TermKeyCode::Esc => (Some('\u{1b}'), KeyCode::ESCAPE),
        TermKeyCode::Backspace => (Some('\u{8}'), KeyCode::BACKSPACE),
        TermKeyCode::Tab | TermKeyCode::BackTab => (Some('\t'), KeyCode::TAB),
        TermKeyCode::Delete => (Some('\u{7f}'), KeyCode::DELETE),
        TermKeyCode::Left => (None, KeyCode::LEFT),
        TermKeyCode::Right => (None, KeyCode::RIGHT),
        TermKeyCode::Up => (None, KeyCode::UP),
        TermKeyCode::Down => (None, KeyCode::DOWN),
        TermKeyCode::F(n) => (None, KeyCode::function(n)),
        _ => (None, KeyCode::UNKNOWN),
    };
    let modifiers = modifiers(key.modifiers);
    let build = |action| KeyEvent::new(action, ch, code).with_modifiers(modifiers);

    let mut events = Vec::with_capacity(3);
    match key.kind {
        KeyEventKind::Press => {
            events.push(SurfaceEvent::Input(build(KeyAction::Press).into()));
            if let Some(ch) = ch.filter(|ch| !ch.is_control() || *ch == '\n' || *ch == '\t') {
                let typed = KeyEvent::typed(ch).with_modifiers(modifiers);
                events.push(SurfaceEvent::Input(typed.into()));
            }
            if synthesize_release {
                events.push(SurfaceEvent::Input(build(KeyAction::Release).into()));
            }
        }
        KeyEventKind::Repeat => {
            events.push(SurfaceEvent::Input(build(KeyAction::Press).repeated().into()));
        }
        KeyEventKind::Release => {
            events.push(SurfaceEvent::Input(build(KeyAction::Release).into()));
        }
    }
    events
}

fn mouse_button(button: TermMouseButton) -> MouseButton {
    match button {
        TermMouseButton::Left => MouseButton::Left,
        TermMouseButton::Middle => MouseButton::Middle,
        TermMouseButton::Right => MouseButton::Right,
    }
}

fn modifiers(mods: KeyModifiers) -> Modifiers {
    Modifiers {
        shift: mods.contains(KeyModifiers::SHIFT),
        ctrl: mods.contains(KeyModifiers::CONTROL),
        alt: mods.contains(KeyModifiers::ALT),
        meta: mods.intersects(KeyModifiers::SUPER | KeyModifiers::META),
    }
}
