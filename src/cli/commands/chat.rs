//! Chat command - interactive grounded Q&A in the terminal.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use console::{Term, style};

use super::{ExitCode, report_error};
use crate::chat::{ChatModel, OpenAiCompatibleClient, Role, Session};
use crate::config::Settings;
use crate::retrieve::Retriever;
use crate::vector::{Collection, open_collection};

/// What the user typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Question(&'a str),
    Clear,
    Rag(Option<bool>),
    Quit,
    Unknown(&'a str),
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with('/') {
        return Input::Question(line);
    }

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("/quit" | "/exit"), _) => Input::Quit,
        (Some("/clear"), _) => Input::Clear,
        (Some("/rag"), Some("on")) => Input::Rag(Some(true)),
        (Some("/rag"), Some("off")) => Input::Rag(Some(false)),
        (Some("/rag"), _) => Input::Rag(None),
        _ => Input::Unknown(line),
    }
}

/// Line source for the gate and the prompt loop.
struct Prompter<R> {
    input: R,
    interactive: bool,
}

impl<R: BufRead> Prompter<R> {
    /// Read one line after printing `prompt`. `None` on end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        eprint!("{prompt}");
        io::stderr().flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Like `read_line`, without echo on a terminal.
    fn read_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        if !self.interactive {
            return self.read_line(prompt);
        }
        let term = Term::stderr();
        term.write_str(prompt)?;
        term.read_secure_line().map(Some)
    }
}

/// Run the chat command.
pub fn run(settings: &Settings, no_rag: bool) -> ExitCode {
    let interactive = is_terminal::is_terminal(io::stdin());
    let stdin = io::stdin();
    let mut prompter = Prompter {
        input: stdin.lock(),
        interactive,
    };

    match chat(settings, !no_rag && settings.chat.use_rag, &mut prompter) {
        Ok(()) => ExitCode::Success,
        Err(e) => report_error(&e),
    }
}

fn chat<R: BufRead>(
    settings: &Settings,
    use_rag: bool,
    prompter: &mut Prompter<R>,
) -> anyhow::Result<()> {
    let mut session = Session::new(use_rag);

    println!("{}", style("PortOps Chat").cyan().bold());
    if !gate(&mut session, prompter)? {
        return Ok(());
    }

    let model = OpenAiCompatibleClient::new(&settings.chat, session.api_key())
        .context("failed to create chat client")?;

    let mut collection: Option<Arc<dyn Collection>> = None;
    if session.use_rag() {
        collection = Some(open_collection(settings).context("failed to open vector store")?);
    }

    println!(
        "Signed in as: {}   RAG: {}",
        style(session.masked_email()).bold(),
        rag_label(session.use_rag())
    );
    for message in session.messages() {
        print_message(message.role, &message.content);
    }

    loop {
        let Some(line) = prompter.read_line(&format!("{} ", style(">").green().bold()))? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Clear => {
                session.clear();
                println!("{}", style("Chat cleared.").dim());
            }
            Input::Rag(None) => println!("RAG is {}", rag_label(session.use_rag())),
            Input::Rag(Some(on)) => {
                if on && collection.is_none() {
                    match open_collection(settings) {
                        Ok(opened) => collection = Some(opened),
                        Err(e) => {
                            eprintln!("{} {e}", style("Cannot enable RAG:").red());
                            continue;
                        }
                    }
                }
                session.set_use_rag(on);
                println!("RAG is {}", rag_label(on));
            }
            Input::Unknown(command) => {
                eprintln!("Unknown command {command}. Try /clear, /rag on|off or /quit.");
            }
            Input::Question(question) => {
                let retriever = collection
                    .as_ref()
                    .map(|c| Retriever::new(c.as_ref(), settings.retrieval.top_k));
                ask(&mut session, question, retriever.as_ref(), &model);
            }
        }
    }

    Ok(())
}

/// Collect email and API key until they pass validation.
/// Returns `false` when input ends first.
fn gate<R: BufRead>(session: &mut Session, prompter: &mut Prompter<R>) -> anyhow::Result<bool> {
    eprintln!("Enter your details to start");
    loop {
        let Some(email) = prompter.read_line("Email ID: ")? else {
            return Ok(false);
        };
        let Some(api_key) = prompter.read_secret("API key: ")? else {
            return Ok(false);
        };

        match session.submit(&email, &api_key) {
            Ok(()) => {
                println!(
                    "\u{2705} Details saved successfully for {}. You can start chatting now.",
                    style(session.masked_email()).bold()
                );
                return Ok(true);
            }
            Err(errors) => {
                for error in errors {
                    eprintln!("{}", style(error).red());
                }
            }
        }
    }
}

fn ask(
    session: &mut Session,
    question: &str,
    retriever: Option<&Retriever<'_>>,
    model: &dyn ChatModel,
) {
    let use_rag = session.use_rag();
    let turn = session.ask(question, retriever, model);

    match turn.answer {
        Ok(answer) => {
            print_message(Role::Assistant, &answer);
            if use_rag {
                println!("{}", style("Sources").bold());
                if turn.hits.is_empty() {
                    println!("  (none)");
                }
                for hit in &turn.hits {
                    println!("  \u{2022} {}", hit.source());
                }
            }
        }
        Err(e) => eprintln!("{}", style(format!("Error: {e}")).red()),
    }
}

fn print_message(role: Role, content: &str) {
    let label = match role {
        Role::Assistant => style("assistant").cyan().bold(),
        Role::User => style("you").green().bold(),
        Role::System => style("system").dim(),
    };
    println!("{label}: {content}");
}

fn rag_label(on: bool) -> console::StyledObject<&'static str> {
    if on {
        style("on").green()
    } else {
        style("off").yellow()
    }
}
