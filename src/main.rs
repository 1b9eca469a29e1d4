use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use codegen_orchestrator::{init_logging, EnvConfig, Orchestrator, Submission, SubmitError};
use gen_contract::Intent;
use stream_assembler::AssemblyEvent;

const USAGE: &str = "usage: codegen <intent> <prompt...>
       codegen <prompt...>
       codegen continue
       codegen history [clear | delete <index>]

intents: generate, complete, explain, fix, optimize, test, document";

/// How long the process waits for history uploads before exiting.
const REMOTE_WRITE_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let config = EnvConfig::from_env();
    init_logging(config.log_filter.as_deref());

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help" | "help") {
        eprintln!("{USAGE}");
        return if args.is_empty() {
            ExitCode::from(2)
        } else {
            ExitCode::SUCCESS
        };
    }

    let orchestrator = match Orchestrator::from_env(&config) {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(error) => {
            eprintln!("codegen: {error}");
            return ExitCode::FAILURE;
        }
    };

    match args[0].as_str() {
        "history" => history_command(&orchestrator, &args[1..]).await,
        "continue" => {
            let _ctrl_c = spawn_ctrl_c_cancel(&orchestrator);
            let result = orchestrator.continue_previous(&mut print_bundle).await;
            orchestrator.flush_remote_writes(REMOTE_WRITE_GRACE).await;
            report(result)
        }
        first => {
            let (intent, prompt) = match Intent::parse(first) {
                Some(intent) if args.len() > 1 => (intent, args[1..].join(" ")),
                _ => (Intent::Generate, args.join(" ")),
            };
            let _ctrl_c = spawn_ctrl_c_cancel(&orchestrator);
            let result = orchestrator.submit(&prompt, intent, &mut print_bundle).await;
            orchestrator.flush_remote_writes(REMOTE_WRITE_GRACE).await;
            report(result)
        }
    }
}

async fn history_command(orchestrator: &Orchestrator, args: &[String]) -> ExitCode {
    match args.first().map(String::as_str) {
        None => {
            let view = orchestrator.load_history().await;
            if view.is_empty() {
                println!("no history yet ({})", orchestrator.history_path().display());
            }
            for (index, turn) in view.iter().enumerate() {
                println!("[{index}] {}  {}", turn.timestamp, turn.question);
            }
            ExitCode::SUCCESS
        }
        Some("clear") => {
            orchestrator.clear_history();
            ExitCode::SUCCESS
        }
        Some("delete") => match args.get(1).and_then(|index| index.parse::<usize>().ok()) {
            Some(index) => {
                if !orchestrator.delete_history_item(index) {
                    eprintln!("codegen: no history entry at index {index}");
                }
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("{USAGE}");
                ExitCode::from(2)
            }
        },
        Some(_) => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
    }
}

/// Streams bundles to stderr so stdout carries only the final artifact.
fn print_bundle(event: AssemblyEvent) {
    if let AssemblyEvent::Bundle { text, .. } = event {
        let mut stderr = io::stderr();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }
}

fn report(result: Result<Submission, SubmitError>) -> ExitCode {
    match result {
        Ok(submission) => {
            eprintln!();
            println!("{}", submission.outcome.artifact);
            if submission.outcome.ending.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            eprintln!("codegen: {error}");
            ExitCode::from(2)
        }
    }
}

fn spawn_ctrl_c_cancel(orchestrator: &Arc<Orchestrator>) -> tokio::task::JoinHandle<()> {
    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            orchestrator.cancel_all();
        }
    })
}
