use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ratatui::layout::Rect;
use tokio::task::JoinHandle;

use crate::client::{Backend, ClientError, ClientResult};
use crate::status::StatusBanner;

pub const CHAT_ERROR_REPLY: &str =
    "Desculpe, ocorreu um erro ao processar sua mensagem. Por favor, tente novamente.";
pub const STATUS_NOT_CSV: &str = "Erro: Apenas arquivos CSV são permitidos.";
pub const STATUS_SENDING: &str = "Enviando arquivo...";
pub const STATUS_UPLOAD_FAILED: &str = "Erro ao enviar arquivo. Tente novamente.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Scrolling the transcript
    Normal,
    /// Typing a chat message
    Editing,
    /// Typing the path of a CSV to upload
    FilePath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Millisecond timestamp, bumped when needed so ids stay strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One turn of the transcript. Fields are read-only once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
}

impl Message {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Append-only transcript. Insertion order is display order.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    last_id: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &Message {
        let id = self.next_id();
        self.messages.push(Message {
            id,
            role,
            content: content.into(),
        });
        &self.messages[self.messages.len() - 1]
    }

    fn next_id(&mut self) -> MessageId {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_id = now_ms.max(self.last_id + 1);
        MessageId(self.last_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Single-line text buffer with a character cursor.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    text: String,
    cursor: usize,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl InputBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

/// The one request allowed in flight.
enum PendingRequest {
    Chat(JoinHandle<ClientResult<String>>),
    Upload {
        file_name: String,
        task: JoinHandle<ClientResult<String>>,
    },
}

impl PendingRequest {
    fn is_finished(&self) -> bool {
        match self {
            PendingRequest::Chat(task) | PendingRequest::Upload { task, .. } => task.is_finished(),
        }
    }

    fn abort(&self) {
        match self {
            PendingRequest::Chat(task) | PendingRequest::Upload { task, .. } => task.abort(),
        }
    }
}

async fn join(task: JoinHandle<ClientResult<String>>) -> ClientResult<String> {
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => Err(ClientError::Task(e.to_string())),
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Session state
    pub messages: MessageStore,
    pub input: InputBuffer,
    pub file_prompt: InputBuffer,
    pub status: StatusBanner,
    pending: Option<PendingRequest>,
    backend: Arc<dyn Backend>,
    pub backend_label: String,

    // Chat view state
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of the transcript pane
    transcript_height: u16, // wrapped line count of the last render
    seen_len: usize,
    seen_busy: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Transcript area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
}

impl App {
    pub fn new(backend: Arc<dyn Backend>, backend_label: impl Into<String>, status_delay: Duration) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            messages: MessageStore::new(),
            input: InputBuffer::default(),
            file_prompt: InputBuffer::default(),
            status: StatusBanner::new(status_delay),
            pending: None,
            backend,
            backend_label: backend_label.into(),

            chat_scroll: 0,
            chat_height: 0,
            transcript_height: 0,
            seen_len: 0,
            seen_busy: false,

            animation_frame: 0,

            chat_area: None,
        }
    }

    /// True while a chat or upload request is in flight.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Submit the input buffer as a chat message.
    ///
    /// Returns false without touching any state when busy or when the buffer
    /// is blank.
    pub fn send_message(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }

        let text = self.input.text().trim().to_string();
        if text.is_empty() {
            return false;
        }

        let id = self.messages.push(Role::User, text.clone()).id();
        self.input.clear();

        tracing::debug!(%id, chars = text.chars().count(), "dispatching chat request");
        let task = tokio::spawn(self.backend.chat(text));
        self.pending = Some(PendingRequest::Chat(task));
        true
    }

    /// Upload the CSV at `path`.
    ///
    /// The file prompt is reset on every attempt. A name without the `.csv`
    /// suffix only sets an error status. Returns true when a request was issued.
    pub fn send_file(&mut self, path: &Path) -> bool {
        if self.is_busy() {
            return false;
        }

        self.file_prompt.clear();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !file_name.ends_with(".csv") {
            tracing::info!(file = %file_name, "rejected non-CSV upload");
            self.status.set(STATUS_NOT_CSV);
            return false;
        }

        self.status.set(STATUS_SENDING);

        let task = tokio::spawn(self.backend.upload(path.to_path_buf()));
        self.pending = Some(PendingRequest::Upload { file_name, task });
        true
    }

    /// Apply the pending request's outcome if it has completed.
    pub async fn poll_pending(&mut self) -> bool {
        if self.pending.as_ref().is_some_and(PendingRequest::is_finished) {
            self.finish_pending().await;
            true
        } else {
            false
        }
    }

    /// Wait for the pending request, if any, and apply its outcome.
    pub async fn finish_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        match pending {
            PendingRequest::Chat(task) => {
                let outcome = join(task).await;
                self.apply_chat_outcome(outcome);
            }
            PendingRequest::Upload { file_name, task } => {
                let outcome = join(task).await;
                self.apply_upload_outcome(&file_name, outcome, Instant::now());
            }
        }
    }

    fn apply_chat_outcome(&mut self, outcome: ClientResult<String>) {
        match outcome {
            Ok(response) => {
                self.messages.push(Role::Assistant, response);
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "chat request failed");
                self.messages.push(Role::Assistant, CHAT_ERROR_REPLY);
            }
        }
    }

    fn apply_upload_outcome(&mut self, file_name: &str, outcome: ClientResult<String>, now: Instant) {
        match outcome {
            Ok(message) => {
                tracing::info!(file = %file_name, "upload succeeded");
                self.status.flash(format!("Sucesso: {}", message), now);
                self.messages.push(
                    Role::Assistant,
                    format!("Arquivo \"{}\" foi carregado com sucesso. {}", file_name, message),
                );
            }
            Err(e) => {
                tracing::warn!(file = %file_name, kind = e.kind(), error = %e, "upload failed");
                self.status.flash(STATUS_UPLOAD_FAILED, now);
            }
        }
    }

    /// Called on every Tick event.
    pub fn on_tick(&mut self, now: Instant) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.status.expire(now);
    }

    /// Stop any request still running.
    pub fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    // Scrolling
    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.transcript_height.saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.visible_height() / 2).max(1));
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.visible_height() / 2).max(1));
    }

    /// Record the rendered transcript height and jump to the bottom when the
    /// transcript grew or the busy indicator appeared.
    pub fn sync_scroll(&mut self, transcript_height: u16) {
        self.transcript_height = transcript_height;

        let busy = self.is_busy();
        if self.messages.len() != self.seen_len || (busy && !self.seen_busy) {
            self.scroll_to_bottom();
        }
        self.seen_len = self.messages.len();
        self.seen_busy = busy;
    }

    /// Scroll so the latest entry is visible
    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.transcript_height.saturating_sub(self.visible_height());
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }
}
