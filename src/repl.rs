use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use querydesk_chat::chart::ChartKind;
use querydesk_chat::orchestrator::{ActionOutcome, Orchestrator, Rejection};
use querydesk_core::ids::MessageId;
use querydesk_core::messages::Action;

const HELP: &str = "\
commands:
  <question>                 ask a question
  /execute [n]               run the SQL of message n (default: latest)
  /summarize [n]             summarize the result of message n (default: latest)
  /chart [n] <x> <y> [kind]  chart a result (kind: line, area, bar, column)
  /models, /search           list semantic models / search services
  /use <name>                select or deselect a model or search service
  /prompts [i]               list suggested prompts, or ask prompt i
  /new                       start a new chat
  /quit                      exit";

#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    Execute(Option<usize>),
    Summarize(Option<usize>),
    Chart {
        index: Option<usize>,
        x: String,
        y: String,
        kind: ChartKind,
    },
    Models,
    Search,
    Use(String),
    Prompts(Option<usize>),
    New,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Ask(line.to_string());
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        let index = args.first().and_then(|a| a.parse::<usize>().ok());

        match name {
            "execute" | "x" => Self::Execute(index),
            "summarize" | "s" => Self::Summarize(index),
            "chart" => {
                let rest = if index.is_some() { &args[1..] } else { &args[..] };
                match rest {
                    [x, y, kind @ ..] => Self::Chart {
                        index,
                        x: x.to_string(),
                        y: y.to_string(),
                        kind: kind.first().map_or(ChartKind::default(), |k| ChartKind::parse(k)),
                    },
                    _ => Self::Unknown(line.to_string()),
                }
            }
            "models" => Self::Models,
            "search" => Self::Search,
            "use" if !args.is_empty() => Self::Use(args.join(" ")),
            "prompts" => Self::Prompts(index),
            "new" => Self::New,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Ctrl-C presses for the whole session. Registering the listener replaces
/// the default exit on SIGINT, so the idle prompt treats a press as quit.
fn interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Runs an action to completion. Ctrl-C cancels it and still waits, so the
/// action can clean up its partial output.
async fn run_action(
    orch: &Orchestrator,
    action: impl Future<Output = ActionOutcome>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> ActionOutcome {
    tokio::pin!(action);
    tokio::select! {
        biased;
        outcome = &mut action => outcome,
        Some(()) = interrupts.recv() => {
            orch.cancel_active();
            action.await
        }
    }
}

/// Message at 1-based `index`, or the newest one offering `action`.
fn target(orch: &Orchestrator, index: Option<usize>, action: Action) -> Option<MessageId> {
    let messages = orch.store().snapshot();
    match index {
        Some(n) => messages.get(n.checked_sub(1)?).map(|m| m.id.clone()),
        None => messages
            .iter()
            .rev()
            .find(|m| m.actions.is_set(action))
            .map(|m| m.id.clone()),
    }
}

/// Message at 1-based `index`, or the newest table result.
fn table_target(orch: &Orchestrator, index: Option<usize>) -> Option<MessageId> {
    if index.is_some() {
        return target(orch, index, Action::Summarize);
    }
    orch.store()
        .snapshot()
        .iter()
        .rev()
        .find(|m| m.result().and_then(|r| r.as_table()).is_some())
        .map(|m| m.id.clone())
}

fn report(outcome: &ActionOutcome) {
    match outcome {
        ActionOutcome::Completed | ActionOutcome::Failed(_) => {}
        ActionOutcome::Cancelled => eprintln!("(cancelled)"),
        ActionOutcome::Rejected(reason) => eprintln!(
            "{}",
            match reason {
                Rejection::EmptyPrompt => "nothing to ask",
                Rejection::Busy => "still working on the previous request",
                Rejection::UnknownMessage => "no such message",
                Rejection::NotExecutable => "that message has no SQL to run",
                Rejection::NotSummarizable => "that message has no result to summarize",
            }
        ),
    }
}

fn list(title: &str, offered: &[String], selected: &[String]) {
    if offered.is_empty() {
        println!("no {title} available");
        return;
    }
    println!("{title}:");
    for name in offered {
        let mark = if selected.contains(name) { "x" } else { " " };
        println!("  [{mark}] {name}");
    }
}

pub async fn run(orch: &Orchestrator) -> anyhow::Result<()> {
    println!("querydesk. Ask a question, or /help for commands.");
    session(orch, BufReader::new(tokio::io::stdin()), interrupts()).await
}

async fn session(
    orch: &Orchestrator,
    input: impl AsyncBufRead + Unpin,
    mut interrupts: mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<()> {
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupts.recv() => break,
        };
        let Some(line) = line else { break };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Ask(prompt) => report(&run_action(orch, orch.submit(&prompt), &mut interrupts).await),
            ReplCommand::Execute(index) => match target(orch, index, Action::Execute) {
                Some(id) => report(&run_action(orch, orch.execute(&id), &mut interrupts).await),
                None => eprintln!("no SQL to execute"),
            },
            ReplCommand::Summarize(index) => match target(orch, index, Action::Summarize) {
                Some(id) => report(&run_action(orch, orch.summarize(&id), &mut interrupts).await),
                None => eprintln!("no result to summarize"),
            },
            ReplCommand::Chart { index, x, y, kind } => {
                let chart = table_target(orch, index).and_then(|id| orch.chart(&id, kind, &x, &y));
                match chart {
                    Some(spec) => println!("{}\n", spec.to_text()),
                    None => eprintln!("nothing to chart: pick a table result and two of its columns"),
                }
            }
            ReplCommand::Models => {
                let catalog = orch.catalog();
                list("semantic models", catalog.models(), catalog.selected_models());
            }
            ReplCommand::Search => {
                let catalog = orch.catalog();
                list("search services", catalog.search_services(), catalog.selected_search_services());
            }
            ReplCommand::Use(name) => {
                let toggled = orch
                    .toggle_model(&name)
                    .or_else(|| orch.toggle_search_service(&name));
                match toggled {
                    Some(true) => println!("using {name}"),
                    Some(false) => println!("no longer using {name}"),
                    None => eprintln!("unknown model or search service: {name}"),
                }
            }
            ReplCommand::Prompts(Some(i)) => {
                let outcome = run_action(orch, orch.submit_suggested(i.saturating_sub(1)), &mut interrupts).await;
                report(&outcome)
            }
            ReplCommand::Prompts(None) => {
                for (i, prompt) in orch.suggested_prompts().iter().enumerate() {
                    println!("  {}. {prompt}", i + 1);
                }
            }
            ReplCommand::New => {
                orch.new_chat();
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(input) => eprintln!("unknown command: {input} (try /help)"),
        }
    }
    Ok(())
}
