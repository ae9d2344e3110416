//! Pipeline stage collaborators: transcription, rewriting, persistence.

pub mod rewrite;
pub mod sink;
pub mod transcriber;

pub use rewrite::{OpenRouterRewriter, RewriteChain, RewriteResult, Rewriter};
pub use sink::{GraphTaskSink, MockTaskSink, TaskList, TaskSink, TokenProvider};
pub use transcriber::{MockTranscriber, Transcriber};
