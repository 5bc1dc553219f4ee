use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use crate::app::{App, InputMode, Role};
use crate::format::{format_inline, Fragment};

const WELCOME_TITLE: &str = "Bem-vindo ao Alpha Insights";
const WELCOME_BODY: &str = "Seu assistente de IA para análise de dados de vendas. \
Faça perguntas sobre seus dados ou carregue um arquivo CSV para começar.";
const INPUT_PLACEHOLDER: &str = "Digite sua pergunta sobre os dados...";

/// Map one line of message content to spans, emphasizing `**bold**` runs.
pub fn styled_line(text: &str) -> Line<'static> {
    let spans: Vec<Span<'static>> = format_inline(text)
        .map(|fragment| {
            let style = match fragment {
                Fragment::Bold(_) => Style::default().add_modifier(Modifier::BOLD),
                Fragment::Plain(_) => Style::default(),
            };
            Span::styled(fragment.text().to_string(), style)
        })
        .collect();

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let status_height = if app.status.text().is_some() { 3 } else { 0 };

    let [header_area, chat_area, status_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(status_height),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    if status_height > 0 {
        render_status(app, frame, status_area);
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.input_mode == InputMode::FilePath {
        render_file_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" ▮▮▮ Alpha Insights ", Style::default().fg(Color::Blue).bold()),
        Span::styled(format!(" {} ", app.backend_label), Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    // Inner size minus borders, for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);

    let chat = Paragraph::new(Text::from(transcript(app))).wrap(Wrap { trim: false });
    let total_lines = u16::try_from(chat.line_count(inner_width)).unwrap_or(u16::MAX);
    app.sync_scroll(total_lines);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    if app.messages.is_empty() && !app.is_busy() {
        render_welcome(frame, block, area);
        return;
    }

    let chat = chat.block(block).scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);

    if total_lines > app.chat_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines as usize)
            .position(app.chat_scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin { vertical: 1, horizontal: 0 }),
            &mut scrollbar_state,
        );
    }
}

/// Transcript lines before wrapping: label, content, blank line per message.
fn transcript(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for msg in app.messages.iter() {
        let (label, color, alignment) = match msg.role() {
            Role::User => ("Você", Color::Cyan, Alignment::Right),
            Role::Assistant => ("Alpha", Color::Yellow, Alignment::Left),
        };

        lines.push(
            Line::from(Span::styled(
                label,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ))
            .alignment(alignment),
        );
        for line in msg.content().lines() {
            lines.push(styled_line(line).alignment(alignment));
        }
        lines.push(Line::default());
    }

    if app.is_busy() {
        lines.push(Line::from(Span::styled(
            "Alpha",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Pensando{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_welcome(frame: &mut Frame, block: Block, area: Rect) {
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [_, welcome_area, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(6),
        Constraint::Fill(1),
    ])
    .areas(inner);

    let welcome = Paragraph::new(vec![
        Line::from(Span::styled("▮▮▮", Style::default().fg(Color::Blue).bold())),
        Line::default(),
        Line::from(Span::styled(WELCOME_TITLE, Style::default().fg(Color::White).bold())),
        Line::default(),
        Line::from(Span::styled(WELCOME_BODY, Style::default().fg(Color::Gray))),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });

    frame.render_widget(welcome, welcome_area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let text = app.status.text().unwrap_or_default();
    let status = Paragraph::new(text)
        .style(Style::default().fg(Color::Gray))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(status, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let busy = app.is_busy();
    let editing = app.input_mode == InputMode::Editing;

    let border_color = if busy {
        Color::DarkGray
    } else if editing {
        Color::Blue
    } else {
        Color::Gray
    };
    let title = if busy { " Aguardando resposta... " } else { " Mensagem " };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scrolling keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input.cursor();
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let input = if app.input.is_empty() {
        Paragraph::new(INPUT_PLACEHOLDER).style(Style::default().fg(Color::DarkGray))
    } else {
        let visible_text: String = app
            .input
            .text()
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        let style = if busy {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Cyan)
        };
        Paragraph::new(visible_text).style(style)
    };

    frame.render_widget(input.block(input_block), area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" VIEW ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" CHAT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        InputMode::FilePath => (" CSV ", Style::default().bg(Color::Green).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[
            (" Enter ", " send "),
            (" Ctrl+O ", " attach CSV "),
            (" PgUp/PgDn ", " scroll "),
            (" Esc ", " view "),
        ],
        InputMode::Normal => &[
            (" j/k ", " scroll "),
            (" g/G ", " top/bottom "),
            (" i ", " type "),
            (" u ", " attach CSV "),
            (" q ", " quit "),
        ],
        InputMode::FilePath => &[(" Enter ", " upload "), (" Esc ", " cancel ")],
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    for (key, label) in hints {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    let footer = Paragraph::new(Line::from(spans)).style(label_style);
    frame.render_widget(footer, area);
}

fn render_file_prompt(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 70.min(area.width.saturating_sub(4));
    let popup_height = 6;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(" Anexar arquivo CSV ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Caminho do arquivo .csv. Enter para enviar, Esc para cancelar.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);

    let width = input_area.width as usize;
    let cursor_pos = app.file_prompt.cursor();
    let scroll_offset = if width > 0 && cursor_pos >= width {
        cursor_pos - width + 1
    } else {
        0
    };
    let visible: String = app
        .file_prompt
        .text()
        .chars()
        .skip(scroll_offset)
        .take(width)
        .collect();

    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiClient;
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_app() -> App {
        App::new(
            Arc::new(ApiClient::new("http://localhost:3000")),
            "localhost:3000",
            Duration::from_secs(3),
        )
    }

    fn draw(app: &mut App) -> Buffer {
        draw_sized(app, 100, 30)
    }

    fn draw_sized(app: &mut App, width: u16, height: u16) -> Buffer {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();
        terminal.backend().buffer().clone()
    }

    fn buffer_text(buffer: &Buffer) -> String {
        buffer.content.iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn test_styled_line_bolds_delimited_runs() {
        let line = styled_line("Q1 revenue was **$2M**");
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[0].content, "Q1 revenue was ");
        assert!(!line.spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(line.spans[1].content, "$2M");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_empty_session_shows_welcome() {
        let mut app = test_app();
        let text = buffer_text(&draw(&mut app));
        assert!(text.contains(WELCOME_TITLE));
        assert!(text.contains(INPUT_PLACEHOLDER));
    }

    #[test]
    fn test_transcript_replaces_welcome() {
        let mut app = test_app();
        app.messages.push(Role::User, "What was Q1 revenue?");
        app.messages.push(Role::Assistant, "Q1 revenue was **$2M**");

        let buffer = draw(&mut app);
        let text = buffer_text(&buffer);
        assert!(!text.contains(WELCOME_TITLE));
        assert!(text.contains("What was Q1 revenue?"));
        assert!(text.contains("Q1 revenue was $2M"));
        assert!(!text.contains("**"));

        let cells = &buffer.content;
        let bold_at = (0..cells.len() - 2)
            .find(|&i| {
                cells[i].symbol() == "$" && cells[i + 1].symbol() == "2" && cells[i + 2].symbol() == "M"
            })
            .unwrap();
        assert!(cells[bold_at].modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_status_banner_is_shown() {
        let mut app = test_app();
        app.status.set("Enviando arquivo...");
        let text = buffer_text(&draw(&mut app));
        assert!(text.contains("Enviando arquivo..."));
    }

    #[test]
    fn test_file_prompt_popup() {
        let mut app = test_app();
        app.input_mode = InputMode::FilePath;
        for c in "vendas.csv".chars() {
            app.file_prompt.insert(c);
        }
        let text = buffer_text(&draw(&mut app));
        assert!(text.contains("Anexar arquivo CSV"));
        assert!(text.contains("vendas.csv"));
    }

    #[test]
    fn test_auto_scroll_reaches_end_of_word_wrapped_reply() {
        let mut app = test_app();
        app.messages.push(Role::User, "x");
        let reply: Vec<String> = (0..10).map(|i| format!("word{i:02}")).collect();
        app.messages.push(Role::Assistant, reply.join(" "));

        // 10 columns inside the border: one word per wrapped line
        let text = buffer_text(&draw_sized(&mut app, 12, 14));
        assert!(app.chat_scroll > 0);
        assert!(text.contains("word09"));
        assert!(!text.contains("word00"));
    }

    #[test]
    fn test_long_unbroken_line_is_fully_scrolled() {
        let mut app = test_app();
        app.messages.push(Role::Assistant, format!("{}END", "a".repeat(60)));

        let text = buffer_text(&draw_sized(&mut app, 12, 10));
        assert!(text.contains("END"));
    }
}
