use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use askdocs::{
    Answer, Answerer, AuditLog, Embedder, GenerationRequest, Generator, Indexer, QueryError,
    QueryStage, RetryPolicy, ServiceError, VectorStore,
};
use pretty_assertions::assert_eq;

const DOCUMENT: &str = "The grass is green.\n\nThe sky is blue today.\n\nWater is wet.";
const QUESTION: &str = "what color is the sky?";

/// Maps questions and fragments onto fixed unit vectors.
#[derive(Default)]
struct StubEmbedder {
    query_calls: AtomicUsize,
    reject: bool,
    unavailable: bool,
}

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        if text.contains("unrelated") {
            return Ok(vec![-1.0, 0.0]);
        }
        if text.contains("what color") {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(ServiceError::Unauthorized("401 invalid api key".into()));
            }
            if self.unavailable {
                return Err(ServiceError::Transient("503 overloaded".into()));
            }
            return Ok(vec![1.0, 0.0]);
        }
        if text.contains("sky is blue") {
            return Ok(vec![0.9, 0.435_889_9]);
        }
        Ok(vec![0.1, 0.994_987_4])
    }
}

/// Records prompts and replies with a canned answer, or always fails.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
    always_fail: bool,
    reply: Option<&'static str>,
}

impl Generator for RecordingGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(request.prompt.to_string());
        if self.always_fail {
            return Err(ServiceError::Transient("503 overloaded".into()));
        }
        Ok(self.reply.unwrap_or("  The sky is blue.").to_string())
    }
}

fn indexed_store(dir: &std::path::Path) -> VectorStore {
    let store = VectorStore::new(dir);
    Indexer::new(StubEmbedder::default(), store.clone())
        .index_document("weather.txt", DOCUMENT)
        .expect("index document");
    store
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::ZERO)
}

#[test]
fn answers_from_the_only_relevant_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let store = indexed_store(dir.path());
    assert_eq!(store.load_all().unwrap().fragment_count(), 3);

    let generator = RecordingGenerator::default();
    let answerer = Answerer::new(StubEmbedder::default(), &generator, store);
    let answer = answerer.ask(QUESTION).unwrap();

    assert_eq!(
        answer,
        Answer::Answered {
            text: "The sky is blue.".to_string(),
            context: "The sky is blue today.".to_string(),
        }
    );
    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("The sky is blue today."));
    assert!(prompts[0].contains(QUESTION));
    assert!(!prompts[0].contains("grass"));
}

#[test]
fn empty_store_is_no_match() {
    let dir = tempfile::tempdir().unwrap();
    let generator = RecordingGenerator::default();
    let answerer = Answerer::new(
        StubEmbedder::default(),
        &generator,
        VectorStore::new(dir.path().join("never-created")),
    );
    assert_eq!(answerer.ask(QUESTION).unwrap(), Answer::NoMatch);
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[test]
fn rejected_credential_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let store = indexed_store(dir.path());
    let embedder = StubEmbedder {
        reject: true,
        ..Default::default()
    };
    let answerer = Answerer::new(&embedder, RecordingGenerator::default(), store)
        .with_retry(fast_retry());

    let err = answerer.ask(QUESTION).unwrap_err();
    assert!(matches!(
        err,
        QueryError::InvalidCredential {
            stage: QueryStage::EmbeddingQuery,
            ..
        }
    ));
    assert_eq!(embedder.query_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn generation_failures_exhaust_retries() {
    let dir = tempfile::tempdir().unwrap();
    let store = indexed_store(dir.path());
    let generator = RecordingGenerator {
        always_fail: true,
        ..Default::default()
    };
    let answerer =
        Answerer::new(StubEmbedder::default(), &generator, store).with_retry(fast_retry());

    match answerer.ask(QUESTION).unwrap_err() {
        QueryError::TransientService {
            stage, attempts, ..
        } => {
            assert_eq!(stage, QueryStage::GeneratingAnswer);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(generator.prompts.lock().unwrap().len(), 3);
}

#[test]
fn outcomes_are_audited() {
    let dir = tempfile::tempdir().unwrap();
    let store = indexed_store(&dir.path().join("store"));
    let log_path = dir.path().join("askdocs.log");
    let answerer = Answerer::new(
        StubEmbedder::default(),
        RecordingGenerator::default(),
        store,
    )
    .with_audit_log(AuditLog::new(&log_path));

    answerer.ask(QUESTION).unwrap();
    assert_eq!(answerer.ask("an unrelated question").unwrap(), Answer::NoMatch);

    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.starts_with("Question: what color is the sky?, Answer: The sky is blue.\n\n"));
    assert!(log.ends_with(", Answer: No good matches found.\n\n"));
}

#[test]
fn repeated_questions_hit_the_query_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = indexed_store(dir.path());
    let embedder = StubEmbedder::default();
    let answerer = Answerer::new(&embedder, RecordingGenerator::default(), store)
        .with_query_cache(8);

    answerer.ask(QUESTION).unwrap();
    answerer.ask(QUESTION).unwrap();
    assert_eq!(embedder.query_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn embedding_failures_exhaust_retries_and_are_audited() {
    let dir = tempfile::tempdir().unwrap();
    let store = indexed_store(&dir.path().join("store"));
    let log_path = dir.path().join("askdocs.log");
    let embedder = StubEmbedder {
        unavailable: true,
        ..Default::default()
    };
    let answerer = Answerer::new(&embedder, RecordingGenerator::default(), store)
        .with_retry(fast_retry())
        .with_audit_log(AuditLog::new(&log_path));

    match answerer.ask(QUESTION).unwrap_err() {
        QueryError::TransientService {
            stage, attempts, ..
        } => {
            assert_eq!(stage, QueryStage::EmbeddingQuery);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(embedder.query_calls.load(Ordering::SeqCst), 3);

    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.starts_with("Question: what color is the sky?, Exception: "));
    assert!(log.contains("embedding_query"));
    assert!(log.ends_with("\n\n"));
}

#[test]
fn unreadable_store_is_a_corpus_read_failure() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("store");
    fs::write(&not_a_dir, "plain file").unwrap();
    let log_path = dir.path().join("askdocs.log");
    let generator = RecordingGenerator::default();
    let store = VectorStore::new(&not_a_dir);
    let answerer = Answerer::new(StubEmbedder::default(), &generator, store)
        .with_audit_log(AuditLog::new(&log_path));

    let err = answerer.ask(QUESTION).unwrap_err();
    assert!(matches!(err, QueryError::CorpusRead(_)), "{err:?}");
    assert!(generator.prompts.lock().unwrap().is_empty());

    let log = fs::read_to_string(&log_path).unwrap();
    assert_eq!(log, format!("Question: {QUESTION}, Exception: {err}\n\n"));
}

#[test]
fn blank_generation_is_no_answer() {
    let dir = tempfile::tempdir().unwrap();
    let store = indexed_store(&dir.path().join("store"));
    let log_path = dir.path().join("askdocs.log");
    let generator = RecordingGenerator {
        reply: Some("   \n"),
        ..Default::default()
    };
    let answerer = Answerer::new(StubEmbedder::default(), &generator, store)
        .with_audit_log(AuditLog::new(&log_path));

    let err = answerer.ask(QUESTION).unwrap_err();
    assert!(matches!(err, QueryError::NoAnswer));
    assert_eq!(generator.prompts.lock().unwrap().len(), 1);

    let log = fs::read_to_string(&log_path).unwrap();
    assert_eq!(
        log,
        "Question: what color is the sky?, Exception: the model did not return an answer\n\n"
    );
}
