//! Turns transcript snapshots into incremental terminal output.

use alma_core::Transcript;
use alma_model::{ContentBlock, Role, SearchResult, SearchStatus};

/// A piece of a reply that hasn't been shown yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    /// Text to append to what's already printed.
    Text(String),
    /// A search was started.
    SearchStarted(String),
    /// The last started search has finished.
    SearchFinished(Vec<SearchResult>),
}

/// Tracks how much of a streaming reply has been shown.
///
/// Feed it every snapshot of the transcript while the reply streams,
/// and it returns only what changed since the last call.
#[derive(Clone, Debug)]
pub struct ReplyPrinter {
    msg_idx: usize,
    block_idx: usize,
    text_len: usize,
    query_shown: bool,
    results_shown: bool,
}

impl ReplyPrinter {
    /// Creates a printer for a reply whose first message will be at
    /// `msg_idx` in the transcript.
    #[inline]
    pub fn new(msg_idx: usize) -> Self {
        Self {
            msg_idx,
            block_idx: 0,
            text_len: 0,
            query_shown: false,
            results_shown: false,
        }
    }

    /// Returns what was added to the reply since the last call.
    pub fn advance(&mut self, transcript: &Transcript) -> Vec<Chunk> {
        let messages = transcript.messages();
        let mut chunks = vec![];

        while let Some(msg) = messages.get(self.msg_idx) {
            let is_last_msg = self.msg_idx + 1 == messages.len();
            if msg.role == Role::Assistant {
                while let Some(block) = msg.content_blocks.get(self.block_idx) {
                    self.show_block(block, &mut chunks);
                    let is_last_block =
                        self.block_idx + 1 == msg.content_blocks.len();
                    if is_last_msg && is_last_block {
                        // Still open, more may be added to it.
                        return chunks;
                    }
                    self.block_idx += 1;
                    self.reset_block();
                }
            }
            if is_last_msg {
                break;
            }
            self.msg_idx += 1;
            self.block_idx = 0;
            self.reset_block();
        }
        chunks
    }

    fn show_block(&mut self, block: &ContentBlock, chunks: &mut Vec<Chunk>) {
        match block {
            ContentBlock::Text { text } => {
                if text.len() > self.text_len {
                    chunks.push(Chunk::Text(text[self.text_len..].to_owned()));
                    self.text_len = text.len();
                }
            }
            ContentBlock::Search {
                query,
                status,
                results,
            } => {
                if !self.query_shown {
                    chunks.push(Chunk::SearchStarted(query.clone()));
                    self.query_shown = true;
                }
                if *status == SearchStatus::Completed && !self.results_shown {
                    chunks.push(Chunk::SearchFinished(results.clone()));
                    self.results_shown = true;
                }
            }
        }
    }

    #[inline]
    fn reset_block(&mut self) {
        self.text_len = 0;
        self.query_shown = false;
        self.results_shown = false;
    }
}
