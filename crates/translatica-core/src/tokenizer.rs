//! Text tokenization for Marian translation models

use std::path::Path;

use tokenizers::Tokenizer as HfTokenizer;
use tracing::debug;

use crate::error::{Error, Result};

/// Ids the source side needs besides the vocabulary itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eos_id: u32,
    pub pad_id: u32,
}

pub struct TextTokenizer {
    inner: HfTokenizer,
    special_tokens: SpecialTokens,
}

impl TextTokenizer {
    pub fn from_file(path: &Path, special_tokens: SpecialTokens) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ModelLoadError(format!(
                "No tokenizer found at {:?}",
                path
            )));
        }
        let inner = HfTokenizer::from_file(path)
            .map_err(|e| Error::ModelLoadError(format!("Invalid tokenizer {:?}: {}", path, e)))?;
        debug!("Loaded tokenizer from {:?}", path);
        Ok(Self::new(inner, special_tokens))
    }

    pub fn new(inner: HfTokenizer, special_tokens: SpecialTokens) -> Self {
        Self {
            inner,
            special_tokens,
        }
    }

    /// Encode a single sentence, truncated so that it fits in `max_length`
    /// tokens once EOS is appended.
    pub fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>> {
        let budget = max_length.saturating_sub(1).max(1);

        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| Error::TokenizationError(e.to_string()))?;

        let mut ids: Vec<u32> = encoding
            .get_ids()
            .iter()
            .copied()
            .filter(|id| *id != self.special_tokens.pad_id && *id != self.special_tokens.eos_id)
            .take(budget)
            .collect();
        ids.push(self.special_tokens.eos_id);
        Ok(ids)
    }

    /// Decode ids back to text, dropping special tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| Error::TokenizationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokenizers::models::wordlevel::WordLevel;
    use tokenizers::pre_tokenizers::whitespace::Whitespace;
    use tokenizers::AddedToken;

    const WORDS: [&str; 9] = [
        "<pad>", "</s>", "<unk>", "hello", "world", "hola", "mundo", "again", "fin ",
    ];

    fn word_level_tokenizer() -> HfTokenizer {
        let vocab: HashMap<String, u32> = WORDS
            .iter()
            .enumerate()
            .map(|(id, word)| (word.to_string(), id as u32))
            .collect();
        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token("<unk>".to_string())
            .build()
            .unwrap();
        let mut tokenizer = HfTokenizer::new(model);
        tokenizer.with_pre_tokenizer(Whitespace {});
        tokenizer.add_special_tokens(&[
            AddedToken::from("<pad>", true),
            AddedToken::from("</s>", true),
        ]);
        tokenizer
    }

    fn special() -> SpecialTokens {
        SpecialTokens { eos_id: 1, pad_id: 0 }
    }

    #[test]
    fn test_encode_appends_eos() {
        let tokenizer = TextTokenizer::new(word_level_tokenizer(), special());
        assert_eq!(tokenizer.encode("hello world", 512).unwrap(), vec![3, 4, 1]);
    }

    #[test]
    fn test_encode_truncates_to_budget_including_eos() {
        let tokenizer = TextTokenizer::new(word_level_tokenizer(), special());
        let ids = tokenizer.encode("hello world hello world again", 3).unwrap();
        assert_eq!(ids, vec![3, 4, 1]);
    }

    #[test]
    fn test_decode_skips_special_tokens() {
        let tokenizer = TextTokenizer::new(word_level_tokenizer(), special());
        assert_eq!(tokenizer.decode(&[0, 5, 6, 1]).unwrap(), "hola mundo");
        assert_eq!(tokenizer.decode(&[0, 1]).unwrap(), "");
    }

    #[test]
    fn test_decode_keeps_surrounding_whitespace() {
        let tokenizer = TextTokenizer::new(word_level_tokenizer(), special());
        assert_eq!(tokenizer.decode(&[5, 8, 1]).unwrap(), "hola fin ");
    }

    #[test]
    fn test_encode_limit_applies_per_call() {
        let tokenizer = TextTokenizer::new(word_level_tokenizer(), special());
        assert_eq!(tokenizer.encode("hello world again", 2).unwrap(), vec![3, 1]);
        assert_eq!(
            tokenizer.encode("hello world again", 16).unwrap(),
            vec![3, 4, 7, 1]
        );
    }

    #[test]
    fn test_from_file_roundtrips_saved_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        word_level_tokenizer().save(&path, false).unwrap();

        let tokenizer = TextTokenizer::from_file(&path, special()).unwrap();
        assert_eq!(tokenizer.encode("hola", 16).unwrap(), vec![5, 1]);
    }

    #[test]
    fn test_from_file_missing_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TextTokenizer::from_file(&dir.path().join("nope.json"), special());
        assert!(matches!(result, Err(Error::ModelLoadError(_))));
    }
}
