//! Instruction dataset generation from cleaned documents.
//!
//! Each document's text is cut into windows of `chunk_size` words; every
//! window becomes one [`InstructSample`] whose answer is the window and whose
//! instruction asks for content of that category in the author's voice.
//! Samples are then shuffled and split into train and test sets, and written
//! as `train.jsonl` and `test.jsonl`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::Category;

use super::error::PipelineError;
use super::steps::CleanedDocument;

/// Words from the start of a chunk quoted in its instruction.
const LEAD_WORDS: usize = 8;

/// One instruction/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructSample {
    pub instruction: String,
    pub answer: String,
    pub category: Category,
    pub author: String,
}

/// Train and test splits of an instruction dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructDataset {
    pub train: Vec<InstructSample>,
    pub test: Vec<InstructSample>,
}

impl InstructDataset {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty() && self.test.is_empty()
    }

    /// Per-category sample counts for each split:
    /// `{"train": {"num_samples": N, "<collection>": n}, "test": {...}}`.
    pub fn to_metadata(&self) -> Value {
        json!({
            "train": split_metadata(&self.train),
            "test": split_metadata(&self.test),
        })
    }

    /// Writes `train.jsonl` and `test.jsonl` into `dir`, one sample per line.
    pub fn export_jsonl(&self, dir: &Path) -> Result<(PathBuf, PathBuf), PipelineError> {
        fs::create_dir_all(dir)?;
        let train = write_jsonl(&dir.join("train.jsonl"), &self.train)?;
        let test = write_jsonl(&dir.join("test.jsonl"), &self.test)?;
        Ok((train, test))
    }
}

fn split_metadata(samples: &[InstructSample]) -> Value {
    let mut per_category: BTreeMap<Category, usize> = BTreeMap::new();
    for sample in samples {
        *per_category.entry(sample.category).or_insert(0) += 1;
    }

    let mut metadata = serde_json::Map::new();
    metadata.insert("num_samples".to_string(), json!(samples.len()));
    for (category, count) in per_category {
        metadata.insert(category.collection_name().to_string(), json!(count));
    }
    Value::Object(metadata)
}

fn write_jsonl(path: &Path, samples: &[InstructSample]) -> Result<PathBuf, PipelineError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for sample in samples {
        let line = serde_json::to_string(sample)?;
        writeln!(writer, "{}", line)?;
    }

    writer.flush()?;
    Ok(path.to_path_buf())
}

/// Builds one sample per `chunk_size`-word window of each document.
///
/// A trailing window shorter than half a chunk is merged into the previous
/// window so no sample is a tiny fragment.
pub fn build_instruction_samples(
    documents: &[CleanedDocument],
    chunk_size: usize,
) -> Vec<InstructSample> {
    let chunk_size = chunk_size.max(1);
    let mut samples = Vec::new();

    for document in documents {
        let words: Vec<&str> = document.content.split_whitespace().collect();
        for chunk in chunk_words(&words, chunk_size) {
            let lead = chunk[..chunk.len().min(LEAD_WORDS)].join(" ");
            samples.push(InstructSample {
                instruction: format!(
                    "Write a {} in the style of {} that starts with: \"{}\"",
                    document.category.singular(),
                    document.author_full_name,
                    lead
                ),
                answer: chunk.join(" "),
                category: document.category,
                author: document.author_full_name.clone(),
            });
        }
    }

    samples
}

fn chunk_words<'a>(words: &'a [&'a str], chunk_size: usize) -> Vec<&'a [&'a str]> {
    let mut chunks: Vec<&[&str]> = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        let remaining = words.len() - end;
        if remaining > 0 && remaining * 2 < chunk_size {
            chunks.push(&words[start..]);
            break;
        }
        chunks.push(&words[start..end]);
        start = end;
    }

    chunks
}

/// Shuffles `samples` and holds out `test_size` of them as the test split.
///
/// The test split gets `round(len * test_size)` samples, but at least one
/// when there are two or more samples and never all of them. The same seed
/// always yields the same split.
pub fn train_test_split(
    mut samples: Vec<InstructSample>,
    test_size: f64,
    seed: Option<u64>,
) -> InstructDataset {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };
    samples.shuffle(&mut rng);

    let len = samples.len();
    let mut test_len = ((len as f64) * test_size).round() as usize;
    if len >= 2 {
        test_len = test_len.clamp(1, len - 1);
    } else {
        test_len = 0;
    }

    let test = samples.split_off(len - test_len);
    InstructDataset {
        train: samples,
        test,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn cleaned(category: Category, words: usize) -> CleanedDocument {
        CleanedDocument {
            id: Uuid::new_v4(),
            category,
            author_id: Uuid::new_v4(),
            author_full_name: "Jane Doe".to_string(),
            platform: "test".to_string(),
            link: "https://example.com".to_string(),
            content: (0..words)
                .map(|i| format!("w{}", i))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn samples(n: usize) -> Vec<InstructSample> {
        build_instruction_samples(&[cleaned(Category::Articles, n * 10)], 10)
    }

    #[test]
    fn test_chunking_merges_short_tail() {
        let docs = [cleaned(Category::Posts, 23)];
        let samples = build_instruction_samples(&docs, 10);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].answer.split_whitespace().count(), 10);
        assert_eq!(samples[1].answer.split_whitespace().count(), 13);
        assert_eq!(samples[1].category, Category::Posts);
        assert_eq!(samples[1].author, "Jane Doe");
    }

    #[test]
    fn test_chunking_keeps_long_tail() {
        let docs = [cleaned(Category::Articles, 26)];
        let samples = build_instruction_samples(&docs, 10);
        let sizes: Vec<usize> = samples
            .iter()
            .map(|s| s.answer.split_whitespace().count())
            .collect();
        assert_eq!(sizes, vec![10, 10, 6]);
    }

    #[test]
    fn test_instruction_mentions_category_and_author() {
        let samples = build_instruction_samples(&[cleaned(Category::Repositories, 3)], 10);
        assert_eq!(samples.len(), 1);
        assert_eq!(
            samples[0].instruction,
            "Write a repository in the style of Jane Doe that starts with: \"w0 w1 w2\""
        );
        assert_eq!(samples[0].answer, "w0 w1 w2");
    }

    #[test]
    fn test_empty_documents_yield_no_samples() {
        let mut doc = cleaned(Category::Posts, 0);
        doc.content = String::new();
        assert!(build_instruction_samples(&[doc], 10).is_empty());
    }

    #[test]
    fn test_split_sizes() {
        let dataset = train_test_split(samples(20), 0.1, Some(7));
        assert_eq!(dataset.test.len(), 2);
        assert_eq!(dataset.train.len(), 18);

        let dataset = train_test_split(samples(3), 0.01, Some(7));
        assert_eq!(dataset.test.len(), 1);

        let dataset = train_test_split(samples(3), 0.99, Some(7));
        assert_eq!(dataset.train.len(), 1);

        let dataset = train_test_split(samples(1), 0.5, Some(7));
        assert_eq!(dataset.train.len(), 1);
        assert!(dataset.test.is_empty());
    }

    #[test]
    fn test_split_is_deterministic_with_seed() {
        let a = train_test_split(samples(30), 0.2, Some(42));
        let b = train_test_split(samples(30), 0.2, Some(42));
        assert_eq!(a, b);
        assert_eq!(a.len(), 30);
    }

    #[test]
    fn test_metadata_counts_per_split() {
        let mut all = build_instruction_samples(&[cleaned(Category::Articles, 40)], 10);
        all.extend(build_instruction_samples(&[cleaned(Category::Posts, 10)], 10));

        let dataset = InstructDataset {
            train: all[..4].to_vec(),
            test: all[4..].to_vec(),
        };
        assert_eq!(
            dataset.to_metadata(),
            json!({
                "train": {"num_samples": 4, "articles": 4},
                "test": {"num_samples": 1, "posts": 1},
            })
        );
    }

    #[test]
    fn test_export_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = train_test_split(samples(10), 0.2, Some(1));

        let (train, test) = dataset.export_jsonl(dir.path()).unwrap();
        assert_eq!(train, dir.path().join("train.jsonl"));

        let train_lines = std::fs::read_to_string(train).unwrap();
        assert_eq!(train_lines.lines().count(), 8);
        let first: InstructSample =
            serde_json::from_str(train_lines.lines().next().unwrap()).unwrap();
        assert_eq!(first.category, Category::Articles);

        let test_lines = std::fs::read_to_string(test).unwrap();
        assert_eq!(test_lines.lines().count(), 2);
    }
}
