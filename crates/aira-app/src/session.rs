//! Terminal chat session: reads user input, runs turns, and renders
//! progress events as they arrive.

use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use aira_chat::{ActionStatus, ConversationOrchestrator, SessionContext, TurnEvent, TurnOutcome};
use aira_core::types::{ContentPart, Role, Utterance};

const HELP: &str = "Commands: /image <path> [question], /suggest, /reset, /help, /quit";

/// Input line parsed into a session command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Say(String),
    Image { path: String, question: String },
    Suggest,
    Reset,
    Help,
    Quit,
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Input::Say(line.to_string());
        };
        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        match name {
            "quit" | "exit" => Input::Quit,
            "reset" => Input::Reset,
            "suggest" => Input::Suggest,
            "help" => Input::Help,
            "image" if !rest.trim().is_empty() => {
                let rest = rest.trim();
                let (path, question) = rest.split_once(' ').unwrap_or((rest, ""));
                Input::Image {
                    path: path.to_string(),
                    question: question.trim().to_string(),
                }
            }
            _ => Input::Help,
        }
    }
}

/// Media type for an image file, by extension.
pub fn image_media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

// =============================================================================
// Streaming output
// =============================================================================

/// Renders reply fragments as they stream in.
///
/// With directive stripping on, output stops at the first `##` so inline
/// commands never flash on screen; [`ReplyPrinter::finish`] prints whatever
/// display text remains once the turn completes.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    hide_directives: bool,
    reply: String,
    printed: usize,
}

impl ReplyPrinter {
    pub fn new(hide_directives: bool) -> Self {
        Self {
            hide_directives,
            ..Default::default()
        }
    }

    /// Append a fragment and return the newly printable text.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.reply.push_str(fragment);
        let visible = if self.hide_directives {
            self.reply
                .find("##")
                .unwrap_or_else(|| self.reply.trim_end_matches('#').len())
        } else {
            self.reply.len()
        };
        let start = self.printed;
        if visible <= start {
            return "";
        }
        self.printed = visible;
        &self.reply[start..visible]
    }

    /// Forget the current attempt.
    pub fn restart(&mut self) {
        self.reply.clear();
        self.printed = 0;
    }

    /// Text still to print so the screen shows `display_text` in full.
    ///
    /// Display text is trimmed, so the shown prefix is compared without its
    /// surrounding whitespace.
    pub fn finish(&self, display_text: &str) -> String {
        let shown = self.reply[..self.printed].trim();
        if shown.is_empty() {
            return display_text.to_string();
        }
        match display_text.strip_prefix(shown) {
            Some(rest) => rest.to_string(),
            None => format!("\n{}", display_text),
        }
    }
}

fn render_event(printer: &mut ReplyPrinter, event: TurnEvent) {
    let mut out = std::io::stdout();
    match event {
        TurnEvent::SearchStarted { query } => {
            let _ = writeln!(out, "[searching the web: {}]", query);
        }
        TurnEvent::SearchFinished { found } => {
            if !found {
                let _ = writeln!(out, "[no usable search results]");
            }
        }
        TurnEvent::Fragment(text) => {
            let _ = write!(out, "{}", printer.push(&text));
        }
        TurnEvent::AttemptFailed { attempt, error } => {
            printer.restart();
            let _ = writeln!(out, "\n[attempt {} failed: {}]", attempt, error);
        }
        TurnEvent::ActionApplied(_) | TurnEvent::ActionFailed(_) | TurnEvent::HistorySaved => {}
    }
    let _ = out.flush();
}

fn spawn_renderer(
    mut rx: mpsc::UnboundedReceiver<TurnEvent>,
    hide_directives: bool,
) -> JoinHandle<ReplyPrinter> {
    tokio::spawn(async move {
        let mut printer = ReplyPrinter::new(hide_directives);
        while let Some(event) = rx.recv().await {
            render_event(&mut printer, event);
        }
        printer
    })
}

fn print_actions(outcome: &TurnOutcome) {
    for action in &outcome.actions {
        match &action.status {
            ActionStatus::Applied { id } => {
                println!("  ✓ {} {} (id {})", action.kind.marker(), action.label, id)
            }
            ActionStatus::NotFound { id } => {
                println!("  ✗ {}: no record with id {}", action.kind.marker(), id)
            }
            ActionStatus::Failed { error } => {
                println!("  ✗ {} {}: {}", action.kind.marker(), action.label, error)
            }
        }
    }
    if outcome.history_saved {
        println!("  [history saved]");
    }
}

/// Submit one utterance and render the turn on stdout.
pub async fn run_turn(
    orchestrator: &ConversationOrchestrator,
    session: &mut SessionContext,
    utterance: Utterance,
    hide_directives: bool,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = spawn_renderer(rx, hide_directives);

    print!("AIRA: ");
    let _ = std::io::stdout().flush();
    let result = orchestrator
        .submit_user_turn(session, utterance, Some(&tx))
        .await;
    drop(tx);

    let printer = match renderer.await {
        Ok(printer) => printer,
        Err(e) => {
            tracing::warn!(error = %e, "Renderer task failed");
            ReplyPrinter::new(hide_directives)
        }
    };

    match result {
        Ok(outcome) => {
            println!("{}", printer.finish(&outcome.display_text));
            print_actions(&outcome);
        }
        Err(e) => println!("\n[{}]", e),
    }
}

/// Interactive loop over stdin until `/quit` or end of input.
pub async fn run_chat(
    orchestrator: &ConversationOrchestrator,
    mut session: SessionContext,
    hide_directives: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match &session.acting_member_id {
        Some(id) => println!("Chatting as member {}. {}", id, HELP),
        None => println!("Chatting in shared mode. {}", HELP),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Input::parse(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => println!("{}", HELP),
            Input::Say(text) => {
                run_turn(orchestrator, &mut session, Utterance::user_text(text), hide_directives)
                    .await
            }
            Input::Image { path, question } => {
                let path = Path::new(&path);
                let Some(media_type) = image_media_type(path) else {
                    println!("[unsupported image type: {}]", path.display());
                    continue;
                };
                let bytes = match tokio::fs::read(path).await {
                    Ok(b) => b,
                    Err(e) => {
                        println!("[cannot read {}: {}]", path.display(), e);
                        continue;
                    }
                };
                let mut parts = Vec::with_capacity(2);
                if !question.is_empty() {
                    parts.push(ContentPart::text(question));
                }
                parts.push(ContentPart::image(media_type, &bytes));
                let utterance = Utterance::new(Role::User, parts);
                run_turn(orchestrator, &mut session, utterance, hide_directives).await;
            }
            Input::Suggest => {
                let suggestions = orchestrator
                    .suggested_questions(session.acting_member_id.as_deref(), 4)
                    .await;
                for s in suggestions {
                    println!("  • {}", s);
                }
            }
            Input::Reset => {
                let saved = orchestrator.reset_session(&mut session).await;
                println!("[conversation cleared{}]", if saved { ", history saved" } else { "" });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aira_chat::strip_directives;

    #[test]
    fn test_parse_input() {
        assert_eq!(Input::parse("  "), Input::Empty);
        assert_eq!(Input::parse("Tối nay ăn gì?"), Input::Say("Tối nay ăn gì?".to_string()));
        assert_eq!(Input::parse("/quit"), Input::Quit);
        assert_eq!(Input::parse("/reset"), Input::Reset);
        assert_eq!(Input::parse("/unknown"), Input::Help);
        assert_eq!(Input::parse("/image"), Input::Help);
        assert_eq!(
            Input::parse("/image cake.jpg Đây là bánh gì?"),
            Input::Image {
                path: "cake.jpg".to_string(),
                question: "Đây là bánh gì?".to_string()
            }
        );
    }

    #[test]
    fn test_image_media_type() {
        assert_eq!(image_media_type(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(image_media_type(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(image_media_type(Path::new("a.txt")), None);
        assert_eq!(image_media_type(Path::new("noext")), None);
    }

    #[test]
    fn test_printer_holds_back_directives() {
        let mut printer = ReplyPrinter::new(true);
        assert_eq!(printer.push("Đã thêm "), "Đã thêm ");
        assert_eq!(printer.push("sự kiện.#"), "sự kiện.");
        assert_eq!(printer.push("#ADD_EVENT:{}##"), "");
        assert_eq!(printer.finish("Đã thêm sự kiện."), "");
    }

    #[test]
    fn test_printer_single_hash_is_released() {
        let mut printer = ReplyPrinter::new(true);
        assert_eq!(printer.push("Số #"), "Số ");
        assert_eq!(printer.push("1 nhé"), "#1 nhé");
    }

    #[test]
    fn test_printer_shows_everything_when_not_hiding() {
        let mut printer = ReplyPrinter::new(false);
        assert_eq!(printer.push("ok ##DELETE_EVENT:1##"), "ok ##DELETE_EVENT:1##");
        assert_eq!(printer.finish("ok ##DELETE_EVENT:1##"), "");
    }

    #[test]
    fn test_printer_event_reply_printed_once() {
        let reply = r#"Đã thêm! ##ADD_EVENT:{"title":"Họp gia đình","date":"ngày mai","time":"19:00"}##"#;
        let mut printer = ReplyPrinter::new(true);
        assert_eq!(printer.push(reply), "Đã thêm! ");
        assert_eq!(printer.finish(&strip_directives(reply)), "");
    }

    #[test]
    fn test_printer_text_after_directive() {
        let reply = "  Xong. ##DELETE_EVENT:4## Còn gì nữa không?";
        let mut printer = ReplyPrinter::new(true);
        assert_eq!(printer.push(reply), "  Xong. ");
        assert_eq!(printer.finish(&strip_directives(reply)), " Còn gì nữa không?");
    }

    #[test]
    fn test_printer_nothing_shown_prints_all() {
        let mut printer = ReplyPrinter::new(true);
        assert_eq!(printer.push("##DELETE_EVENT:4##"), "");
        assert_eq!(printer.finish("Đã xoá."), "Đã xoá.");
    }

    #[test]
    fn test_printer_restart_and_mismatch() {
        let mut printer = ReplyPrinter::new(true);
        printer.push("partial");
        printer.restart();
        assert_eq!(printer.push("Full"), "Full");
        assert_eq!(printer.finish("Full reply"), " reply");
        assert_eq!(printer.finish("Other"), "\nOther");
    }
}
