use std::io::{self, Write};
use std::sync::Arc;

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use sketch_runtime::logging::FileSink;
use sketch_runtime::{
    EngineConfig, FrameContext, KeyAction, KeyEvent, LifecycleLoggerExtension, Logger,
    MouseAction, MouseEvent, Result, RuntimeAudit, RuntimeAuditEvent, Sketch, SketchRuntime,
    TerminalDriver, TerminalRenderer,
};

/// Follows the mouse with a cursor glyph. Space toggles the loop, `+`/`-`
/// change the frame rate, Escape quits.
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut config = EngineConfig::default().with_frame_rate(30.0);
    if let Ok(path) = std::env::var("SKETCH_LOG") {
        config = config.with_logger(Logger::new(FileSink::new(path, 1 << 20)?));
    }
    if std::env::var_os("SKETCH_AUDIT").is_some() {
        config = config.with_audit(Arc::new(StderrAudit));
    }
    let logger = config.logger.clone();

    let sketch = Sketch::new(Cursor::default())
        .setup(|cursor, ctx| {
            cursor.rate = ctx.info().target_frame_rate;
            Ok(())
        })
        .draw(draw)
        .mouse(on_mouse)
        .key(on_key);

    let mut runtime = SketchRuntime::new(sketch, TerminalRenderer::stdout(), config);
    if let Some(logger) = logger {
        runtime.install(LifecycleLoggerExtension::new(logger).log_mouse(true));
    }

    let runtime = TerminalDriver::new(runtime).run()?;
    println!(
        "drew {} frames, {} clicks",
        runtime.frame_count(),
        runtime.model().clicks
    );
    Ok(())
}

#[derive(Default)]
struct Cursor {
    clicks: u32,
    paused: bool,
    rate: f64,
}

fn draw(cursor: &mut Cursor, ctx: &mut FrameContext<'_>) -> Result<()> {
    let mut out = io::stdout();
    let mouse = ctx.mouse();
    let position = mouse.position();
    let glyph = if mouse.pressed() { '#' } else { '@' };
    let status = format!(
        "frame {:>6}  {:>5.1} fps (target {:.0})  clicks {}  {}",
        ctx.frame_count(),
        ctx.frame_rate(),
        cursor.rate,
        cursor.clicks,
        if cursor.paused { "[paused]" } else { "" },
    );

    queue!(
        out,
        Clear(ClearType::All),
        MoveTo(0, 0),
        Print(status),
        MoveTo(position.x as u16, position.y as u16),
        Print(glyph)
    )?;
    out.flush()?;
    Ok(())
}

fn on_mouse(cursor: &mut Cursor, ctx: &mut FrameContext<'_>, event: &MouseEvent) -> Result<()> {
    if event.action == MouseAction::Click {
        cursor.clicks += 1;
    }
    if cursor.paused {
        ctx.redraw();
    }
    Ok(())
}

fn on_key(cursor: &mut Cursor, ctx: &mut FrameContext<'_>, event: &KeyEvent) -> Result<()> {
    if event.action != KeyAction::Type {
        return Ok(());
    }
    match event.key {
        Some(' ') => {
            cursor.paused = !cursor.paused;
            if cursor.paused {
                ctx.no_loop();
            } else {
                ctx.start_loop();
            }
            ctx.redraw();
        }
        Some('+') => {
            cursor.rate = (cursor.rate + 5.0).min(120.0);
            ctx.set_frame_rate(cursor.rate);
        }
        Some('-') => {
            cursor.rate = (cursor.rate - 5.0).max(5.0);
            ctx.set_frame_rate(cursor.rate);
        }
        _ => {}
    }
    Ok(())
}

struct StderrAudit;

impl RuntimeAudit for StderrAudit {
    fn record(&self, event: RuntimeAuditEvent) {
        let details = event
            .details
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        eprintln!("[AUDIT] {:?} {details}", event.stage);
    }
}
