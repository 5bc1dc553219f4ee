use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, InputBuffer, InputMode};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize => {}
        AppEvent::Tick => app.on_tick(Instant::now()),
    }

    app.poll_pending().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
        InputMode::FilePath => handle_file_prompt(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),

        // Half-page scroll (must be before plain 'd'/'u' to match first)
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),

        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_to_bottom(),

        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,
        KeyCode::Char('u') => open_file_prompt(app),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => {
            app.send_message();
        }
        KeyCode::Char('o') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            open_file_prompt(app);
        }
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Up => app.scroll_up(1),
        _ => edit_buffer(&mut app.input, key),
    }
}

fn handle_file_prompt(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.file_prompt.clear();
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Enter => submit_file_prompt(app),
        _ => edit_buffer(&mut app.file_prompt, key),
    }
}

fn edit_buffer(buffer: &mut InputBuffer, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => buffer.backspace(),
        KeyCode::Delete => buffer.delete(),
        KeyCode::Left => buffer.left(),
        KeyCode::Right => buffer.right(),
        KeyCode::Home => buffer.home(),
        KeyCode::End => buffer.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => buffer.insert(c),
        _ => {}
    }
}

/// The attach action is disabled while a request is in flight.
fn open_file_prompt(app: &mut App) {
    if app.is_busy() {
        return;
    }
    app.file_prompt.clear();
    app.input_mode = InputMode::FilePath;
}

fn submit_file_prompt(app: &mut App) {
    app.input_mode = InputMode::Editing;

    let raw = app.file_prompt.text().to_string();
    match resolve_path(&raw) {
        Some(path) => {
            app.send_file(&path);
        }
        None => app.file_prompt.clear(),
    }
}

/// Turn prompt text into a path: trims whitespace and surrounding quotes
/// (terminals add them on drag-and-drop) and expands a leading `~/`.
fn resolve_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim().trim_matches(|c| c == '\'' || c == '"');
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Some(home.join(rest));
        }
    }

    Some(PathBuf::from(trimmed))
}

fn handle_paste(app: &mut App, text: &str) {
    let buffer = match app.input_mode {
        InputMode::FilePath => &mut app.file_prompt,
        InputMode::Editing => &mut app.input,
        InputMode::Normal => return,
    };

    // Single-line buffers: newlines become spaces
    for c in text.chars() {
        buffer.insert(if c == '\n' || c == '\r' { ' ' } else { c });
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);

    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
