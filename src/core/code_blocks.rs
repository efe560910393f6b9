//! Fenced code block extraction and the per-session block index.
//!
//! Blocks are addressed by the owning turn's ID plus a letter ordinal
//! (`ab` → `aba`, `abb`, …). The index is rebuilt wholesale for a turn
//! whenever that turn's content stabilizes: every entry previously owned
//! by the turn is dropped and the content is rescanned. An address can
//! therefore dangle after a wholesale content replacement; lookups just
//! miss in that case.

use std::collections::HashMap;

use crate::core::ids;

const FENCE: &str = "```";

/// A fenced code region found inside a turn's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub id: String,
    pub language: String,
    pub content: String,
    pub owner_turn_id: String,
}

/// Session-owned mapping from block address to block.
#[derive(Debug, Default)]
pub struct CodeBlockIndex {
    blocks: HashMap<String, CodeBlock>,
}

impl CodeBlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every block owned by `turn_id` and rescans `content`.
    pub fn rebuild_for_turn(&mut self, turn_id: &str, content: &str) {
        self.blocks.retain(|_, block| block.owner_turn_id != turn_id);

        for (index, fence) in extract_fenced_blocks(content).into_iter().enumerate() {
            let id = ids::block_id(turn_id, index);
            self.blocks.insert(
                id.clone(),
                CodeBlock {
                    id,
                    language: fence.language,
                    content: fence.content,
                    owner_turn_id: turn_id.to_string(),
                },
            );
        }
    }

    pub fn get(&self, block_id: &str) -> Option<&CodeBlock> {
        self.blocks.get(block_id)
    }

    /// Blocks owned by one turn, in address order.
    pub fn blocks_for_turn(&self, turn_id: &str) -> Vec<&CodeBlock> {
        let mut owned: Vec<&CodeBlock> = self
            .blocks
            .values()
            .filter(|block| block.owner_turn_id == turn_id)
            .collect();
        owned.sort_by(|a, b| a.id.cmp(&b.id));
        owned
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A scanned fence before it is given an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    pub language: String,
    pub content: String,
}

/// Scans `content` for complete fenced regions.
///
/// A fence opens at any ``` followed by an optional word-character
/// language tag and a newline, and closes at the next ``` anywhere.
/// A fence with no closing marker is not extracted.
pub fn extract_fenced_blocks(content: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(found) = content[cursor..].find(FENCE) {
        let open = cursor + found;
        let after_ticks = open + FENCE.len();

        let language_len = content[after_ticks..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum::<usize>();
        let language_end = after_ticks + language_len;

        if !content[language_end..].starts_with('\n') {
            // Not an opening fence (```` inline, or trailing junk on the
            // fence line); resume scanning after these backticks.
            cursor = after_ticks;
            continue;
        }

        let body_start = language_end + 1;
        let Some(close) = content[body_start..].find(FENCE) else {
            // Unterminated fence: nothing past this point is extractable.
            break;
        };
        let body_end = body_start + close;

        blocks.push(FencedBlock {
            language: content[after_ticks..language_end].trim().to_string(),
            content: content[body_start..body_end].trim().to_string(),
        });

        cursor = body_end + FENCE.len();
    }

    blocks
}
