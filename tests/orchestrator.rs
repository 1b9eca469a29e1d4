use std::sync::Arc;
use std::time::Duration;

use codegen_orchestrator::{Orchestrator, SubmitError};
use gen_contract::{EntryKind, GenerationTransport, Intent, RemoteHistory, TransportError};
use gen_contract_mock::{InMemoryRemoteHistory, ManualClock, ScriptStep, ScriptedTransport};
use history_store::{history_file, HistoryConfig, HistoryStore, LocalHistoryFile};
use pretty_assertions::assert_eq;
use request_profile::{RequestProfileResolver, ResolverConfig};
use stream_assembler::{AssemblerConfig, AssemblyEvent, FailureKind, StreamEnding};
use tempfile::TempDir;

fn history(dir: &TempDir, clock: &Arc<ManualClock>) -> HistoryStore {
    HistoryStore::open(
        HistoryConfig::default(),
        LocalHistoryFile::new(history_file(dir.path())),
        None,
        clock.as_shared(),
    )
}

fn orchestrator(
    transport: &Arc<ScriptedTransport>,
    history: HistoryStore,
    clock: &Arc<ManualClock>,
) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(transport) as Arc<dyn GenerationTransport>,
        RequestProfileResolver::new(ResolverConfig::default(), None, clock.as_shared()),
        history,
        AssemblerConfig::default(),
        clock.as_shared(),
    )
}

fn finalized_endings(events: &[AssemblyEvent]) -> Vec<StreamEnding> {
    events
        .iter()
        .filter_map(|event| match event {
            AssemblyEvent::Finalized(outcome) => Some(outcome.ending.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn simple_print_request_yields_one_line_and_is_recorded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let transport = Arc::new(ScriptedTransport::tokens([
        "print",
        "(\"jay\")",
        "<|endoftext|>",
        "\nprint(\"more\")",
    ]));
    let orchestrator = orchestrator(&transport, history(&dir, &clock), &clock);

    let mut events = Vec::new();
    let mut emit = |event: AssemblyEvent| events.push(event);
    let submission = orchestrator
        .submit("print jay", Intent::Generate, &mut emit)
        .await
        .expect("valid prompt");

    assert_eq!(submission.outcome.artifact, "print(\"jay\")");
    assert!(submission.outcome.ending.is_success());
    assert!(submission.recorded);

    let sent = transport.opened_requests();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].prompt.starts_with("Write a single print statement"));

    let turns = orchestrator.history();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns.turns()[0].question, "print jay");
    assert_eq!(turns.turns()[0].response, "print(\"jay\")");
    assert_eq!(finalized_endings(&events).len(), 1);
}

#[tokio::test]
async fn invalid_prompt_never_reaches_the_transport() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let transport = Arc::new(ScriptedTransport::tokens(["unused"]));
    let orchestrator = orchestrator(&transport, history(&dir, &clock), &clock);

    let result = orchestrator
        .submit("   ", Intent::Generate, &mut |_event: AssemblyEvent| {})
        .await;

    assert!(matches!(result, Err(SubmitError::InvalidPrompt(_))));
    assert!(transport.opened_requests().is_empty());
}

#[tokio::test]
async fn failed_generation_is_explained_but_not_recorded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let transport = Arc::new(ScriptedTransport::failing(TransportError::Unreachable(
        "connection refused".to_string(),
    )));
    let orchestrator = orchestrator(&transport, history(&dir, &clock), &clock);

    let submission = orchestrator
        .submit(
            "write a function that merges two sorted lists",
            Intent::Generate,
            &mut |_event: AssemblyEvent| {},
        )
        .await
        .expect("valid prompt");

    assert!(matches!(
        submission.outcome.ending,
        StreamEnding::Errored(ref failure) if failure.kind == FailureKind::NetworkUnreachable
    ));
    assert!(submission.outcome.artifact.starts_with("# "));
    assert!(!submission.recorded);
    assert!(orchestrator.history().is_empty());
}

#[tokio::test]
async fn continue_without_history_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let transport = Arc::new(ScriptedTransport::tokens(["unused"]));
    let orchestrator = orchestrator(&transport, history(&dir, &clock), &clock);

    let result = orchestrator
        .continue_previous(&mut |_event: AssemblyEvent| {})
        .await;
    assert!(matches!(result, Err(SubmitError::NothingToContinue)));
}

#[tokio::test]
async fn continue_sends_the_previous_answer_as_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let store = history(&dir, &clock);
    store
        .append("write a fibonacci function", "def fib(n):\n    if n < 2:")
        .expect("seed history");
    let transport = Arc::new(ScriptedTransport::tokens(["\n        return n\n"]));
    let orchestrator = orchestrator(&transport, store, &clock);

    let submission = orchestrator
        .continue_previous(&mut |_event: AssemblyEvent| {})
        .await
        .expect("history has a turn");

    assert!(submission.outcome.ending.is_success());
    let sent = transport.opened_requests();
    assert_eq!(sent[0].intent, Intent::Complete);
    assert_eq!(
        sent[0].context.as_deref(),
        Some("def fib(n):\n    if n < 2:")
    );
    assert_eq!(
        orchestrator.history().turns()[0].question,
        "write a fibonacci function (continued)"
    );
}

#[tokio::test]
async fn continue_past_the_deadline_is_reported_as_a_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let store = history(&dir, &clock);
    store
        .append("write a web server", "use std::net::TcpListener;")
        .expect("seed history");
    let transport = Arc::new(ScriptedTransport::with_steps(vec![
        ScriptStep::Token("fn main() {\n".to_string()),
        ScriptStep::Delay(Duration::from_secs(5)),
        ScriptStep::Token("}\n".to_string()),
        ScriptStep::Done,
    ]));
    let orchestrator = orchestrator(&transport, store, &clock)
        .with_continue_timeout(Duration::from_millis(100));

    let mut events = Vec::new();
    let mut emit = |event: AssemblyEvent| events.push(event);
    let submission = orchestrator
        .continue_previous(&mut emit)
        .await
        .expect("history has a turn");

    let StreamEnding::Errored(failure) = &submission.outcome.ending else {
        panic!("expected a timeout, got {:?}", submission.outcome.ending);
    };
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(submission.outcome.diagnostic.as_deref(), Some("fn main() {"));
    assert!(!submission.recorded);
    assert_eq!(
        finalized_endings(&events),
        vec![submission.outcome.ending.clone()]
    );
    assert_eq!(orchestrator.history().len(), 1);
}

#[tokio::test]
async fn history_items_can_be_deleted_and_cleared() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let store = history(&dir, &clock);
    store.append("first", "1").expect("append");
    store.append("second", "2").expect("append");
    let transport = Arc::new(ScriptedTransport::tokens(["unused"]));
    let orchestrator = orchestrator(&transport, store, &clock);

    assert!(!orchestrator.delete_history_item(5));
    assert!(orchestrator.delete_history_item(0));
    assert_eq!(orchestrator.history().turns()[0].question, "first");

    orchestrator.clear_history();
    assert!(orchestrator.load_history().await.is_empty());
}

#[tokio::test]
async fn concurrent_submissions_do_not_cancel_each_other() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let transport = Arc::new(
        ScriptedTransport::tokens(["def combine(a, b):\n", "    return a + b\n"])
            .with_token_delay(Duration::from_millis(20)),
    );
    let orchestrator = orchestrator(&transport, history(&dir, &clock), &clock);

    let mut first_events = Vec::new();
    let mut second_events = Vec::new();
    let mut first_emit = |event: AssemblyEvent| first_events.push(event);
    let mut second_emit = |event: AssemblyEvent| second_events.push(event);
    let (first, second) = tokio::join!(
        orchestrator.submit(
            "write a function that adds two numbers together",
            Intent::Generate,
            &mut first_emit,
        ),
        orchestrator.submit(
            "write a function that joins two strings together",
            Intent::Generate,
            &mut second_emit,
        ),
    );
    let first = first.expect("valid prompt");
    let second = second.expect("valid prompt");

    assert_eq!(first.outcome.ending, StreamEnding::Completed);
    assert_eq!(second.outcome.ending, StreamEnding::Completed);
    assert_ne!(first.outcome.session_id, second.outcome.session_id);
    assert_eq!(finalized_endings(&first_events), vec![StreamEnding::Completed]);
    assert_eq!(finalized_endings(&second_events), vec![StreamEnding::Completed]);
    assert_eq!(orchestrator.history().len(), 2);
}

#[tokio::test]
async fn cancelling_one_session_leaves_the_other_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let transport = Arc::new(
        ScriptedTransport::tokens(["def combine(a, b):\n", "    return a + b\n"])
            .with_token_delay(Duration::from_millis(20)),
    );
    let orchestrator = orchestrator(&transport, history(&dir, &clock), &clock);
    let host = &orchestrator;

    let mut cancel_on_start = |event: AssemblyEvent| {
        if let AssemblyEvent::Started { session_id } = event {
            assert!(host.cancel(session_id));
        }
    };
    let mut ignore = |_event: AssemblyEvent| {};
    let (cancelled, completed) = tokio::join!(
        host.submit(
            "write a function that adds two numbers together",
            Intent::Generate,
            &mut cancel_on_start,
        ),
        host.submit(
            "write a function that joins two strings together",
            Intent::Generate,
            &mut ignore,
        ),
    );

    assert_eq!(
        cancelled.expect("valid prompt").outcome.ending,
        StreamEnding::Cancelled
    );
    let completed = completed.expect("valid prompt");
    assert_eq!(completed.outcome.ending, StreamEnding::Completed);
    assert!(completed.recorded);
    assert_eq!(orchestrator.cancel_all(), 0);
    assert!(!orchestrator.cancel(completed.outcome.session_id));
}

#[tokio::test]
async fn remote_history_writes_are_flushed_before_exit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::shared();
    let remote = Arc::new(InMemoryRemoteHistory::new());
    let store = HistoryStore::open(
        HistoryConfig::default(),
        LocalHistoryFile::new(history_file(dir.path())),
        Some(Arc::clone(&remote) as Arc<dyn RemoteHistory>),
        clock.as_shared(),
    );
    let transport = Arc::new(ScriptedTransport::tokens(["print(\"jay\")"]));
    let orchestrator = orchestrator(&transport, store, &clock);

    let submission = orchestrator
        .submit("print jay", Intent::Generate, &mut |_event: AssemblyEvent| {})
        .await
        .expect("valid prompt");
    assert!(submission.recorded);

    assert!(orchestrator.flush_remote_writes(Duration::from_secs(1)).await);
    let sessions = remote.session_ids();
    assert_eq!(sessions.len(), 1);
    let kinds: Vec<EntryKind> = remote
        .entries_for(&sessions[0])
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds, vec![EntryKind::Question, EntryKind::Answer]);

    assert!(orchestrator.flush_remote_writes(Duration::from_millis(10)).await);
}
