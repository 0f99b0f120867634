//! Localised text tables.
//!
//! A translation file is an ordinary `.lor` script mirroring the base
//! script's structure, so its text nodes carry the same node ids.
//! [`Translations::extract`] walks a parsed script and records every text
//! statement and choice prompt; the interpreter consults the table by node
//! id before rendering. The FNV-1a content key ties an entry to the exact
//! text it was extracted from, for export tooling and staleness checks.

use loreline_lex::{template_text, TextFragment};
use loreline_par::{Block, Decl, NodeId, Script, Stmt};
use rustc_hash::FxHashMap;

/// One localised text entry.
#[derive(Clone, Debug)]
pub struct TranslationEntry {
    /// `fnv1a64(node id, template text)` of the extracted text.
    pub key: u64,
    /// Template text (literal chunks only).
    pub text: String,
    /// Full fragment stream, interpolations and tags included.
    pub fragments: Vec<TextFragment>,
}

/// A read-only table of localised strings indexed by node id.
#[derive(Clone, Debug, Default)]
pub struct Translations {
    entries: FxHashMap<NodeId, TranslationEntry>,
}

impl Translations {
    /// Extract every text statement and choice prompt from `script`.
    pub fn extract(script: &Script) -> Self {
        let mut entries = FxHashMap::default();
        for decl in &script.decls {
            if let Decl::Beat(beat) = decl {
                extract_block(&beat.body, &mut entries);
            }
        }
        Self { entries }
    }

    /// The entry for a node, if any.
    pub fn lookup(&self, id: NodeId) -> Option<&TranslationEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TranslationEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// The stable content key for a node id and its template text.
    ///
    /// Explicit FNV-1a over the big-endian id bits followed by the text
    /// bytes, so every implementation derives the same key.
    pub fn content_key(id: NodeId, text: &str) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        for byte in id.to_bits().to_be_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
        for byte in text.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
        hash
    }
}

fn extract_block(block: &Block, entries: &mut FxHashMap<NodeId, TranslationEntry>) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Text(text) => {
                insert(entries, text.id, &text.fragments);
            }
            Stmt::If(stmt) => {
                extract_block(&stmt.then_block, entries);
                if let Some(else_block) = &stmt.else_block {
                    extract_block(else_block, entries);
                }
            }
            Stmt::Choice(choice) => {
                for option in &choice.options {
                    insert(entries, option.id, &option.prompt);
                    extract_block(&option.body, entries);
                }
            }
            _ => {}
        }
    }
}

fn insert(entries: &mut FxHashMap<NodeId, TranslationEntry>, id: NodeId, fragments: &[TextFragment]) {
    let text = template_text(fragments);
    entries.insert(
        id,
        TranslationEntry {
            key: Translations::content_key(id, &text),
            text,
            fragments: fragments.to_vec(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreline_par::parse;

    #[test]
    fn test_extract_covers_texts_and_prompts() {
        let script = parse(
            "beat B\n  One.\n  choice\n    First\n      Inside.\n    Second\n",
            None,
            None,
        )
        .unwrap();
        let translations = Translations::extract(&script);
        // narrator line, two prompts, one option-body line
        assert_eq!(translations.len(), 4);
    }

    #[test]
    fn test_mirrored_script_shares_node_ids() {
        let base = parse("beat B\n  The aroma fills the air.\n", None, None).unwrap();
        let localised = parse("beat B\n  ~ L'arôme emplit l'air.\n", None, None).unwrap();
        let base_ids: Vec<NodeId> = Translations::extract(&base).iter().map(|(id, _)| id).collect();
        let table = Translations::extract(&localised);
        assert_eq!(base_ids.len(), 1);
        let entry = table.lookup(base_ids[0]).expect("same structure, same id");
        assert_eq!(entry.text, "L'arôme emplit l'air.");
    }

    #[test]
    fn test_content_key_is_stable_and_text_sensitive() {
        let id = NodeId::new(1, 0, 1, 1);
        let a = Translations::content_key(id, "Hello");
        let b = Translations::content_key(id, "Hello");
        let c = Translations::content_key(id, "Bye");
        let d = Translations::content_key(NodeId::new(1, 0, 1, 2), "Hello");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
