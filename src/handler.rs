use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use crate::app::App;
use crate::client::{ChatOutcome, ChatPayload, WorkerClient};
use crate::stream::SseDecoder;
use crate::tui::{AppEvent, ChatEvent};

fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent, tx: UnboundedSender<AppEvent>) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, tx),
        AppEvent::Chat(chat) => {
            app.apply_chat_event(chat);
            Ok(())
        }
        AppEvent::Tick => {
            app.tick_animation();
            Ok(())
        }
        AppEvent::Resize(_, _) => Ok(()),
    }
}

fn handle_key(app: &mut App, key: KeyEvent, tx: UnboundedSender<AppEvent>) -> Result<()> {
    // Popups swallow all keys while open
    if app.show_model_picker {
        handle_model_picker(app, key);
        return Ok(());
    }
    if app.show_preset_picker {
        handle_preset_picker(app, key);
        return Ok(());
    }
    if app.show_system_editor {
        handle_system_editor(app, key);
        return Ok(());
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => app.should_quit = true,
            KeyCode::Char('l') => app.clear_conversation(),
            KeyCode::Char('o') => app.show_model_picker = true,
            KeyCode::Char('p') => app.show_preset_picker = true,
            KeyCode::Char('e') => app.open_system_editor(),
            KeyCode::Left => app.adjust_temperature(-0.1),
            KeyCode::Right => app.adjust_temperature(0.1),
            _ => {}
        }
        return Ok(());
    }

    match key.code {
        KeyCode::Enter => submit(app, tx),
        KeyCode::Esc => {
            if app.busy {
                app.request_cancel();
            } else {
                app.should_quit = true;
            }
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::PageUp => {
            let half_page = (app.chat_height / 2).max(1);
            app.scroll_up(half_page);
        }
        KeyCode::PageDown => {
            let half_page = (app.chat_height / 2).max(1);
            app.scroll_down(half_page);
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
    Ok(())
}

/// Validate the input line and launch the request task. Empty input and an
/// already-busy client are silent no-ops.
fn submit(app: &mut App, tx: UnboundedSender<AppEvent>) {
    if app.busy {
        return;
    }
    let Some(payload) = ChatPayload::build(&app.input, &app.params, &app.transcript) else {
        return;
    };
    let text = app.input.trim().to_string();

    let (cancel_tx, cancel_rx) = oneshot::channel();
    app.begin_turn(text, cancel_tx);

    let client = app.client.clone();
    let task_tx = tx.clone();
    tokio::spawn(async move {
        // Racing the whole request future covers both the header wait and
        // every chunk wait; dropping it aborts the connection.
        let event = tokio::select! {
            _ = cancel_rx => ChatEvent::Cancelled,
            event = run_turn(client, payload, task_tx.clone()) => event,
        };
        let _ = task_tx.send(AppEvent::Chat(event));
    });
}

/// Drive one request to its final outcome, forwarding stream deltas as
/// they decode.
async fn run_turn(
    client: WorkerClient,
    payload: ChatPayload,
    tx: UnboundedSender<AppEvent>,
) -> ChatEvent {
    match client.send(&payload).await {
        Ok(ChatOutcome::Complete(text)) => ChatEvent::Completed(text),
        Ok(ChatOutcome::Stream(response)) => {
            let mut decoder = SseDecoder::new();
            let mut bytes = response.bytes_stream();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(_) => return ChatEvent::Failed("Request error.".to_string()),
                };
                for delta in decoder.feed(&chunk) {
                    let _ = tx.send(AppEvent::Chat(ChatEvent::Delta(delta)));
                }
                if decoder.is_done() {
                    break;
                }
            }
            // A stream may end without the [DONE] sentinel.
            if let Some(delta) = decoder.finish() {
                let _ = tx.send(AppEvent::Chat(ChatEvent::Delta(delta)));
            }
            ChatEvent::Completed(decoder.into_text())
        }
        Err(err) => ChatEvent::Failed(err.to_string()),
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Down | KeyCode::Char('j') => app.model_picker_nav_down(),
        KeyCode::Up | KeyCode::Char('k') => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

fn handle_preset_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_preset_picker = false,
        KeyCode::Down | KeyCode::Char('j') => app.preset_picker_nav_down(),
        KeyCode::Up | KeyCode::Char('k') => app.preset_picker_nav_up(),
        KeyCode::Enter => app.select_preset(),
        _ => {}
    }
}

fn handle_system_editor(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_system_editor = false,
        KeyCode::Enter => app.commit_system_editor(),
        KeyCode::Backspace => {
            if app.system_cursor > 0 {
                app.system_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.system_input, app.system_cursor);
                app.system_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.system_cursor = app.system_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.system_input.chars().count();
            app.system_cursor = (app.system_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.system_cursor = 0;
        }
        KeyCode::End => {
            app.system_cursor = app.system_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.system_input, app.system_cursor);
            app.system_input.insert(byte_pos, c);
            app.system_cursor += 1;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatParams, DEFAULT_ENDPOINT};
    use tokio::sync::mpsc;

    fn make_app() -> App {
        App::new(WorkerClient::new(DEFAULT_ENDPOINT), ChatParams::default())
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[tokio::test]
    async fn whitespace_submission_is_a_no_op() {
        let mut app = make_app();
        let (tx, mut rx) = mpsc::unbounded_channel();
        app.input = "   ".to_string();
        app.cursor = 3;

        handle_event(&mut app, AppEvent::Key(press(KeyCode::Enter)), tx).unwrap();

        assert!(!app.busy);
        assert!(app.transcript.is_empty());
        assert!(app.display.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn submission_is_unreachable_while_busy() {
        let mut app = make_app();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        app.begin_turn("first".to_string(), cancel_tx);

        app.input = "second".to_string();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Enter)), tx).unwrap();

        // Input untouched: the submission never happened.
        assert_eq!(app.input, "second");
        assert_eq!(app.display.len(), 1);
    }

    #[tokio::test]
    async fn esc_cancels_in_flight_instead_of_quitting() {
        let mut app = make_app();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        app.begin_turn("q".to_string(), cancel_tx);

        handle_event(&mut app, AppEvent::Key(press(KeyCode::Esc)), tx.clone()).unwrap();
        assert!(!app.should_quit);
        assert!(cancel_rx.try_recv().is_ok());

        // Idle Esc quits.
        app.apply_chat_event(ChatEvent::Cancelled);
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Esc)), tx).unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn text_editing_follows_char_cursor() {
        let mut app = make_app();
        let (tx, _rx) = mpsc::unbounded_channel();

        for c in "héllo".chars() {
            handle_event(&mut app, AppEvent::Key(press(KeyCode::Char(c))), tx.clone()).unwrap();
        }
        assert_eq!(app.input, "héllo");
        assert_eq!(app.cursor, 5);

        handle_event(&mut app, AppEvent::Key(press(KeyCode::Left)), tx.clone()).unwrap();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Backspace)), tx.clone()).unwrap();
        assert_eq!(app.input, "hélo");

        handle_event(&mut app, AppEvent::Key(press(KeyCode::Home)), tx.clone()).unwrap();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Delete)), tx).unwrap();
        assert_eq!(app.input, "élo");
    }

    #[tokio::test]
    async fn ctrl_l_clears_conversation() {
        let mut app = make_app();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        app.begin_turn("q".to_string(), cancel_tx);
        app.apply_chat_event(ChatEvent::Completed("a".to_string()));
        assert_eq!(app.transcript.len(), 2);

        handle_event(&mut app, AppEvent::Key(ctrl('l')), tx).unwrap();
        assert!(app.transcript.is_empty());
        assert!(app.display.is_empty());
    }

    #[tokio::test]
    async fn picker_keys_do_not_reach_the_input_line() {
        let mut app = make_app();
        let (tx, _rx) = mpsc::unbounded_channel();
        handle_event(&mut app, AppEvent::Key(ctrl('o')), tx.clone()).unwrap();
        assert!(app.show_model_picker);

        handle_event(&mut app, AppEvent::Key(press(KeyCode::Char('j'))), tx.clone()).unwrap();
        assert!(app.input.is_empty());

        handle_event(&mut app, AppEvent::Key(press(KeyCode::Esc)), tx).unwrap();
        assert!(!app.show_model_picker);
        assert!(!app.should_quit);
    }
}
