//! Question answering: retrieval context + prompt + language model.

use anyhow::{bail, Result};
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use loglens_core::prompt::compose_prompt;
use loglens_core::retrieval::{Retrieval, RetrievalService};

use crate::app::App;
use crate::config::Config;
use crate::llm::{LanguageModel, StreamEvent};

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    #[serde(flatten)]
    pub retrieval: Retrieval,
    pub answer: String,
}

#[derive(Clone)]
pub struct Analyst {
    retrieval: RetrievalService,
    llm: Arc<dyn LanguageModel>,
}

impl Analyst {
    pub fn new(retrieval: RetrievalService, llm: Arc<dyn LanguageModel>) -> Self {
        Self { retrieval, llm }
    }

    pub fn retrieval(&self) -> &RetrievalService {
        &self.retrieval
    }

    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let retrieval = self.retrieval.search(question).await?;
        let prompt = compose_prompt(&retrieval.context, question);
        let answer = self.llm.complete(&prompt).await?;
        Ok(Answer {
            question: question.to_string(),
            retrieval,
            answer: answer.trim().to_string(),
        })
    }

    /// Like [`Analyst::ask`] but streams the answer. Dropping the receiver
    /// stops generation.
    pub async fn ask_stream(
        &self,
        question: &str,
    ) -> Result<(Retrieval, mpsc::Receiver<StreamEvent>)> {
        let retrieval = self.retrieval.search(question).await?;
        let prompt = compose_prompt(&retrieval.context, question);
        let rx = self.llm.stream(&prompt).await?;
        Ok((retrieval, rx))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The model sent its end-of-stream marker.
    Finished,
    /// The output went away; the stream was abandoned.
    OutputClosed,
}

/// Copy streamed chunks to `out` as they arrive. Returns the text written.
///
/// A closed output (broken pipe) ends the stream quietly; other write
/// failures are logged and end it too. A model-side error is returned.
pub async fn write_stream<W: Write>(
    mut rx: mpsc::Receiver<StreamEvent>,
    out: &mut W,
) -> Result<(String, StreamEnd)> {
    let mut text = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Chunk(chunk) => {
                if let Err(e) = out.write_all(chunk.as_bytes()).and_then(|_| out.flush()) {
                    if e.kind() == ErrorKind::BrokenPipe {
                        tracing::debug!("output closed; abandoning answer stream");
                    } else {
                        tracing::warn!(error = %e, "failed to write answer; abandoning stream");
                    }
                    return Ok((text, StreamEnd::OutputClosed));
                }
                text.push_str(&chunk);
            }
            StreamEvent::Done => return Ok((text, StreamEnd::Finished)),
            StreamEvent::Error(message) => bail!("model error: {}", message),
        }
    }
    Ok((text, StreamEnd::Finished))
}

/// Line-based chat: one question per input line, answers written to `out`.
///
/// Blank lines are ignored; `exit` or `quit` ends the session. A failed
/// question is reported and the loop moves on to the next one.
pub async fn chat_loop<R, W>(analyst: &Analyst, input: R, out: &mut W, stream: bool) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        if write_prompt(out).is_err() {
            return Ok(());
        }
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            return Ok(());
        }

        match answer_into(analyst, question, out, stream).await {
            Ok(StreamEnd::Finished) => {}
            Ok(StreamEnd::OutputClosed) => return Ok(()),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "question failed");
                if writeln!(out, "Error: {:#}", e).is_err() {
                    return Ok(());
                }
            }
        }
    }
}

fn write_prompt<W: Write>(out: &mut W) -> std::io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

fn emit<W: Write>(out: &mut W, text: &str) -> StreamEnd {
    match out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        Ok(()) => StreamEnd::Finished,
        Err(e) if e.kind() == ErrorKind::BrokenPipe => StreamEnd::OutputClosed,
        Err(e) => {
            tracing::warn!(error = %e, "failed to write answer");
            StreamEnd::OutputClosed
        }
    }
}

async fn answer_into<W: Write>(
    analyst: &Analyst,
    question: &str,
    out: &mut W,
    stream: bool,
) -> Result<StreamEnd> {
    if !stream {
        let answer = analyst.ask(question).await?;
        if let Some(window) = answer.retrieval.window {
            if emit(out, &format!("[focusing on the {}]\n", window.label())) == StreamEnd::OutputClosed {
                return Ok(StreamEnd::OutputClosed);
            }
        }
        return Ok(emit(out, &format!("{}\n", answer.answer)));
    }

    let (retrieval, rx) = analyst.ask_stream(question).await?;
    if let Some(window) = retrieval.window {
        if emit(out, &format!("[focusing on the {}]\n", window.label())) == StreamEnd::OutputClosed {
            return Ok(StreamEnd::OutputClosed);
        }
    }
    let (_, end) = write_stream(rx, out).await?;
    if end == StreamEnd::Finished {
        return Ok(emit(out, "\n"));
    }
    Ok(end)
}

/// `loglens ask`: answer one question from the current index.
pub async fn run_ask(config: &Config, question: &str, no_stream: bool) -> Result<()> {
    let app = App::open(config).await?;
    let analyst = app.analyst()?;
    let mut stdout = std::io::stdout();
    let result = answer_into(&analyst, question, &mut stdout, config.llm.stream && !no_stream).await;
    app.close().await;
    result.map(|_| ())
}

/// `loglens chat`: ingest in the background and answer questions from stdin.
pub async fn run_chat(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    let analyst = app.analyst()?;
    let service = app.spawn_ingest();
    eprintln!(
        "Monitoring {}. Ask about your logs; 'exit' to quit.",
        config.log.path.display()
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let result = chat_loop(&analyst, stdin, &mut stdout, config.llm.stream).await;

    service.stop().await?;
    app.close().await;
    result
}
