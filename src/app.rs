use ratatui::widgets::ListState;
use tokio::sync::oneshot;

use crate::client::{ChatParams, WorkerClient, ALLOWED_MODELS, TEMPERATURE_RANGE};
use crate::transcript::{Message, Transcript};
use crate::tui::ChatEvent;

/// System prompt presets, selectable from the preset picker.
pub const SYSTEM_PRESETS: &[(&str, &str)] = &[
    ("Helpful", crate::client::DEFAULT_SYSTEM_PROMPT),
    ("Concise", "You are a concise assistant. Answer in as few words as possible."),
    ("Teacher", "You are a patient teacher. Explain concepts step by step with examples."),
    ("Code reviewer", "You are a senior code reviewer. Point out bugs, risks, and cleaner alternatives."),
];

pub struct App {
    // Core state
    pub should_quit: bool,

    // Input line state
    pub input: String,
    pub cursor: usize, // char index into input

    // Conversation state
    pub transcript: Transcript,
    /// Everything visible in the chat pane, including finalized error and
    /// cancelled slots that never enter the transcript.
    pub display: Vec<Message>,

    // In-flight request state
    pub busy: bool,
    /// Assistant text streamed so far for the current turn.
    pub live: String,
    /// User text awaiting its paired assistant reply; committed to the
    /// transcript only on success.
    pub pending_user: Option<String>,
    pub cancel_tx: Option<oneshot::Sender<()>>,

    // Request parameters
    pub params: ChatParams,
    pub client: WorkerClient,

    // Chat pane scroll state
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub model_picker_state: ListState,

    // System preset picker state
    pub show_preset_picker: bool,
    pub preset_picker_state: ListState,

    // System prompt editor state
    pub show_system_editor: bool,
    pub system_input: String,
    pub system_cursor: usize,
}

impl App {
    pub fn new(client: WorkerClient, params: ChatParams) -> Self {
        let mut model_picker_state = ListState::default();
        let selected = ALLOWED_MODELS
            .iter()
            .position(|m| *m == params.model)
            .unwrap_or(0);
        model_picker_state.select(Some(selected));

        let mut preset_picker_state = ListState::default();
        preset_picker_state.select(Some(0));

        Self {
            should_quit: false,

            input: String::new(),
            cursor: 0,

            transcript: Transcript::new(),
            display: Vec::new(),

            busy: false,
            live: String::new(),
            pending_user: None,
            cancel_tx: None,

            params,
            client,

            scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            show_model_picker: false,
            model_picker_state,

            show_preset_picker: false,
            preset_picker_state,

            show_system_editor: false,
            system_input: String::new(),
            system_cursor: 0,
        }
    }

    /// Record the user entry for a new turn and mark the client busy.
    /// The caller has already validated the text and built the payload.
    pub fn begin_turn(&mut self, text: String, cancel_tx: oneshot::Sender<()>) {
        self.display.push(Message::user(text.clone()));
        self.pending_user = Some(text);
        self.live.clear();
        self.busy = true;
        self.cancel_tx = Some(cancel_tx);
        self.input.clear();
        self.cursor = 0;
        self.scroll_to_bottom();
    }

    /// Raise the cancellation signal for the in-flight request, if any.
    /// Cleanup happens when the `Cancelled` outcome arrives.
    pub fn request_cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Apply one event from the request task. This is the single exit path
    /// for every turn outcome, so the busy state is always cleared.
    pub fn apply_chat_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Delta(delta) => {
                self.live.push_str(&delta);
                self.scroll_to_bottom();
                return;
            }
            ChatEvent::Completed(text) => {
                if let Some(user) = self.pending_user.take() {
                    self.transcript.append_exchange(user, text.clone());
                }
                self.display.push(Message::assistant(text));
            }
            ChatEvent::Failed(message) => {
                self.pending_user = None;
                self.display.push(Message::assistant(message));
            }
            ChatEvent::Cancelled => {
                // Keep whatever partial text had streamed, display-only.
                self.pending_user = None;
                let partial = std::mem::take(&mut self.live);
                self.display.push(Message::assistant(partial));
            }
        }

        self.live.clear();
        self.busy = false;
        self.cancel_tx = None;
        self.scroll_to_bottom();
    }

    /// Empty the transcript and the chat pane.
    pub fn clear_conversation(&mut self) {
        self.transcript.clear();
        self.display.clear();
        self.scroll = 0;
    }

    pub fn adjust_temperature(&mut self, delta: f32) {
        self.params.temperature = (self.params.temperature + delta)
            .clamp(*TEMPERATURE_RANGE.start(), *TEMPERATURE_RANGE.end());
        // Keep the displayed value at one decimal place.
        self.params.temperature = (self.params.temperature * 10.0).round() / 10.0;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.busy {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Chat pane scrolling
    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = (self.scroll + lines).min(self.max_scroll());
    }

    /// Pin the view to the newest output.
    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        self.total_chat_lines().saturating_sub(self.visible_height())
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Wrapped line count of the chat pane, mirroring how the UI lays the
    /// entries out: a role line, the wrapped content, a blank separator.
    fn total_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: u16 = 0;
        for msg in &self.display {
            total = total.saturating_add(1); // Role line ("You:" or "AI:")
            total = total.saturating_add(wrapped_line_count(&msg.content, wrap_width));
            total = total.saturating_add(1); // Blank line after message
        }

        if self.busy {
            total = total.saturating_add(1); // "AI:"
            if self.live.is_empty() {
                total = total.saturating_add(1); // "Thinking..."
            } else {
                total = total.saturating_add(wrapped_line_count(&self.live, wrap_width));
            }
            total = total.saturating_add(1);
        }

        total
    }

    // Model picker methods
    pub fn model_picker_nav_down(&mut self) {
        let len = ALLOWED_MODELS.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = ALLOWED_MODELS.get(i) {
                self.params.model = model.to_string();
                self.show_model_picker = false;
                // Save to config
                let _ = crate::config::Config::save_default_model(&self.params.model);
            }
        }
    }

    // Preset picker methods
    pub fn preset_picker_nav_down(&mut self) {
        let len = SYSTEM_PRESETS.len();
        if len > 0 {
            let i = self.preset_picker_state.selected().unwrap_or(0);
            self.preset_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn preset_picker_nav_up(&mut self) {
        let i = self.preset_picker_state.selected().unwrap_or(0);
        self.preset_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_preset(&mut self) {
        if let Some(i) = self.preset_picker_state.selected() {
            if let Some((_, prompt)) = SYSTEM_PRESETS.get(i) {
                self.params.system = prompt.to_string();
                self.show_preset_picker = false;
            }
        }
    }

    // System prompt editor
    pub fn open_system_editor(&mut self) {
        self.system_input = self.params.system.clone();
        self.system_cursor = self.system_input.chars().count();
        self.show_system_editor = true;
    }

    pub fn commit_system_editor(&mut self) {
        self.params.system = self.system_input.clone();
        self.show_system_editor = false;
    }
}

fn wrapped_line_count(content: &str, wrap_width: usize) -> u16 {
    let mut lines: u16 = 0;
    for line in content.lines() {
        // Use character count, not byte length, for proper UTF-8 handling
        let char_count = line.chars().count();
        if char_count == 0 {
            lines = lines.saturating_add(1);
        } else {
            lines = lines.saturating_add(((char_count.saturating_sub(1) / wrap_width) + 1) as u16);
        }
    }
    lines.max(1)
}
