//! BM25-ranked inverted index over video titles and descriptions, stored in
//! three sled trees next to the entity collections.

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use std::collections::HashMap;
use std::convert::TryFrom;
use unic_ucd_category::GeneralCategory;

fn tokens_iter(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c| !is_token_character(c)).filter(|t| !t.is_empty())
}

fn is_token_character(c: char) -> bool {
    let category = GeneralCategory::of(c);
    category.is_number() || category.is_letter() || category == GeneralCategory::PrivateUse
}

const FTS_FREQUENCY_POSTFIX: &[u8] = b"_frequency";
const FTS_TOKENS_POSTFIX: &[u8] = b"_tokens";
const FTS_DOCLEN_POSTIFX: &[u8] = b"_doclen";

/// Holds the summed length of all documents.
const TOTAL_KEY: &[u8] = &[];

const K1: f32 = 1.2;
const B: f32 = 0.75;

#[derive(Clone)]
pub struct FTSTree {
    frequency: sled::Tree,
    tokens: sled::Tree,
    doclen: sled::Tree,
}

pub trait FTSExt {
    fn open_fts<V: AsRef<[u8]>>(&self, name: V) -> sled::Result<FTSTree>;
}

impl FTSExt for sled::Db {
    fn open_fts<V: AsRef<[u8]>>(&self, name: V) -> sled::Result<FTSTree> {
        let name_ref = name.as_ref();

        let mut frequency_name = name_ref.to_vec();
        frequency_name.extend_from_slice(FTS_FREQUENCY_POSTFIX);
        let frequency = self.open_tree(frequency_name)?;

        let mut tokens_name = name_ref.to_vec();
        tokens_name.extend_from_slice(FTS_TOKENS_POSTFIX);
        let tokens = self.open_tree(tokens_name)?;

        let mut doclen_name = name_ref.to_vec();
        doclen_name.extend_from_slice(FTS_DOCLEN_POSTIFX);
        let doclen = self.open_tree(doclen_name)?;

        Ok(FTSTree {
            frequency,
            tokens,
            doclen,
        })
    }
}

fn read_u32(data: &[u8]) -> sled::Result<u32> {
    <[u8; 4]>::try_from(data)
        .map(u32::from_le_bytes)
        .map_err(|_| corrupt())
}

fn read_u64(data: &[u8]) -> sled::Result<u64> {
    <[u8; 8]>::try_from(data)
        .map(u64::from_le_bytes)
        .map_err(|_| corrupt())
}

/// Splits a token entry into its document count and token id.
fn read_token(data: &[u8]) -> sled::Result<(u32, u64)> {
    let count = read_u32(data.get(0..4).ok_or_else(corrupt)?)?;
    let id = read_u64(data.get(4..12).ok_or_else(corrupt)?)?;
    Ok((count, id))
}

fn write_token(count: u32, id: u64) -> Vec<u8> {
    let mut data = count.to_le_bytes().to_vec();
    data.extend_from_slice(&id.to_le_bytes());
    data
}

/// Token frequencies of a document. The empty token counts documents.
fn count_tokens(value: &str) -> (HashMap<String, u32>, u32) {
    let mut token_counts: HashMap<String, u32> = HashMap::new();
    let mut total_count = 0u32;
    for token in tokens_iter(value) {
        *token_counts.entry(token.to_lowercase()).or_insert(0) += 1;
        total_count += 1;
    }
    token_counts.insert(String::new(), 1);
    (token_counts, total_count)
}

fn corrupt() -> sled::Error {
    sled::Error::Unsupported("corrupt search index entry".to_owned())
}

fn mismatch() -> sled::Error {
    sled::Error::Unsupported("value does not match inserted document".to_owned())
}

fn fail<T, E: From<sled::Error>>(err: sled::Error) -> ConflictableTransactionResult<T, E> {
    Err(ConflictableTransactionError::Abort(E::from(err)))
}

fn check<T, E: From<sled::Error>>(result: sled::Result<T>) -> ConflictableTransactionResult<T, E> {
    result.or_else(fail)
}

impl FTSTree {
    /// The trees to pass to a sled transaction, in the order
    /// [`FTSTransaction::new`] expects them.
    pub fn trees(&self) -> [sled::Tree; 3] {
        [
            self.frequency.clone(),
            self.tokens.clone(),
            self.doclen.clone(),
        ]
    }

    pub fn query(&self, value: &str) -> sled::Result<HashMap<sled::IVec, f32>> {
        let (mut token_counts, _) = count_tokens(value);
        token_counts.remove("");

        let mut ret = HashMap::new();

        let num_documents = match self.tokens.get("")? {
            Some(data) => read_token(&data)?.0,
            None => 0,
        };
        if num_documents == 0 {
            return Ok(ret);
        }

        let total_dl = match self.doclen.get(TOTAL_KEY)? {
            Some(dl) => read_u32(&dl)?,
            None => 0,
        };
        let avgdl = (total_dl as f32 / num_documents as f32).max(1.0);
        for (token, count) in token_counts {
            if let Some(token_data) = self.tokens.get(token.as_bytes())? {
                let (total_count, id) = read_token(&token_data)?;
                let idf = ((num_documents as f32 - total_count as f32 + 0.5)
                    / (total_count as f32 + 0.5)
                    + 1.0)
                    .ln();
                for frequency_data_result in self.frequency.scan_prefix(id.to_le_bytes()) {
                    let (id_and_key, frequency_data) = frequency_data_result?;
                    let frequency = read_u32(&frequency_data)?;
                    if frequency == 0 {
                        continue;
                    }
                    let key = sled::IVec::from(id_and_key.get(8..).ok_or_else(corrupt)?);
                    let dl = match self.doclen.get(&key)? {
                        Some(dl) => read_u32(&dl)?,
                        None => continue,
                    };
                    let bm25 = idf * frequency as f32 * (K1 + 1.0)
                        / (frequency as f32 + K1 * (1.0 - B + B * dl as f32 / avgdl));
                    *ret.entry(key).or_insert(0.0) += bm25 * count as f32;
                }
            }
        }

        Ok(ret)
    }
}

/// The index trees inside a transaction that may span other trees too.
pub struct FTSTransaction<'a> {
    frequency: &'a TransactionalTree,
    tokens: &'a TransactionalTree,
    doclen: &'a TransactionalTree,
}

impl<'a> FTSTransaction<'a> {
    /// `trees` are the transactional views of [`FTSTree::trees`].
    pub fn new(trees: &'a [TransactionalTree]) -> Option<FTSTransaction<'a>> {
        match trees {
            [frequency, tokens, doclen] => Some(FTSTransaction {
                frequency,
                tokens,
                doclen,
            }),
            _ => None,
        }
    }

    fn frequency_key(token_id: u64, key: &[u8]) -> Vec<u8> {
        let mut frequency_key = token_id.to_le_bytes().to_vec();
        frequency_key.extend_from_slice(key);
        frequency_key
    }

    fn total_doclen<E: From<sled::Error>>(&self) -> ConflictableTransactionResult<u32, E> {
        match self.doclen.get(TOTAL_KEY)? {
            Some(dl) => check(read_u32(&dl)),
            None => Ok(0),
        }
    }

    pub fn insert<E: From<sled::Error>>(
        &self,
        key: &[u8],
        value: &str,
    ) -> ConflictableTransactionResult<(), E> {
        if key.is_empty() {
            return fail(sled::Error::Unsupported(
                "empty keys are reserved by FTSTree".to_owned(),
            ));
        }
        let (token_counts, total_count) = count_tokens(value);
        if self
            .doclen
            .insert(key, total_count.to_le_bytes().as_ref())?
            .is_some()
        {
            return fail(sled::Error::Unsupported(
                "Updates to FTSTree are not allowed, remove first".to_owned(),
            ));
        }
        let old_total_dl = self.total_doclen()?;
        self.doclen
            .insert(TOTAL_KEY, (old_total_dl + total_count).to_le_bytes().as_ref())?;
        for (token, count) in token_counts.iter() {
            let (old_count, id) = match self.tokens.get(token.as_bytes())? {
                Some(old) => check(read_token(&old))?,
                None => (0, self.tokens.generate_id()?),
            };
            self.frequency
                .insert(Self::frequency_key(id, key), count.to_le_bytes().as_ref())?;
            self.tokens
                .insert(token.as_bytes(), write_token(old_count + 1, id))?;
        }
        Ok(())
    }

    /// `value` must be the text the key was inserted with.
    pub fn remove<E: From<sled::Error>>(
        &self,
        key: &[u8],
        value: &str,
    ) -> ConflictableTransactionResult<(), E> {
        let (token_counts, total_count) = count_tokens(value);
        match self.doclen.remove(key)? {
            Some(old) if old.as_ref() == total_count.to_le_bytes().as_ref() => {}
            _ => return fail(mismatch()),
        }
        let old_total_dl = self.total_doclen()?;
        self.doclen.insert(
            TOTAL_KEY,
            old_total_dl.saturating_sub(total_count).to_le_bytes().as_ref(),
        )?;
        for (token, count) in token_counts.iter() {
            let (old_count, id) = match self.tokens.get(token.as_bytes())? {
                Some(old) => check(read_token(&old))?,
                None => return fail(mismatch()),
            };
            match self.frequency.remove(Self::frequency_key(id, key))? {
                Some(old) if old.as_ref() == count.to_le_bytes().as_ref() => {}
                _ => return fail(mismatch()),
            }
            self.tokens
                .insert(token.as_bytes(), write_token(old_count.saturating_sub(1), id))?;
        }
        Ok(())
    }
}
