use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use askdocs::config::{GeneratorArgs, ModelArgs, RetrievalArgs, RetryArgs};
use askdocs::logging::init_logging;
use askdocs::{Answer, Answerer, QueryError, NO_MATCH_MESSAGE};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "askdocs-ask",
    about = "Answer questions about the indexed documents"
)]
struct AskCli {
    /// Ask a single question and exit; without it an interactive prompt starts
    #[arg(long, short)]
    question: Option<String>,

    /// Print the retrieved context before each answer
    #[arg(long, default_value_t = false)]
    show_context: bool,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    generator: GeneratorArgs,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    #[command(flatten)]
    retry: RetryArgs,
}

fn main() -> Result<()> {
    init_logging();
    let cli = AskCli::parse();
    let embedder = cli.model.build_embedder()?;
    let generator = cli.generator.build_generator(&cli.model)?;
    let mut answerer = Answerer::new(embedder, generator, cli.retrieval.store())
        .with_settings(cli.retrieval.settings(&cli.generator)?)
        .with_retry(cli.retry.policy())
        .with_query_cache(cli.retrieval.query_cache_size);
    if let Some(audit) = cli.retrieval.audit() {
        answerer = answerer.with_audit_log(audit);
    }

    if let Some(question) = &cli.question {
        let answer = answerer.ask(question)?;
        print_answer(&answer, cli.show_context);
        return Ok(());
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("? ");
        io::stdout().flush().context("failed to flush stdout")?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read question")?;
        let question = line.trim();
        if question.is_empty() {
            break;
        }
        match answerer.ask(question) {
            Ok(answer) => print_answer(&answer, cli.show_context),
            Err(err) => report_failure(&err),
        }
    }
    Ok(())
}

fn print_answer(answer: &Answer, show_context: bool) {
    match answer {
        Answer::Answered { text, context } => {
            if show_context {
                println!("--- Retrieved Context ---\n{context}\n");
            }
            println!("{text}\n");
        }
        Answer::NoMatch => println!("{NO_MATCH_MESSAGE}\n"),
    }
}

fn report_failure(err: &QueryError) {
    match err {
        QueryError::TransientService { .. } => {
            println!("The model service is unavailable right now, please try again later.\n")
        }
        other => println!("{other}\n"),
    }
}
