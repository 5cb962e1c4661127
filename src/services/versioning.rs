use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::services::assessment::{in_display_order, Alternative, AssessmentItem, ItemKind};
use crate::services::permutation::{permute, seed_material};

pub(crate) const OPEN_MARKER: char = '*';
pub(crate) const MAX_ROWS: usize = 26;
const BALANCE_TAG: &str = "#balance";
const PAYLOAD_DELIMITER: char = '|';
const MAX_ROW_LABEL_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum VersionError {
    #[error("seed must not be empty")]
    EmptySeed,
    #[error("invalid row label: {0:?}")]
    InvalidRowLabel(String),
    #[error("row label {0} requested more than once")]
    DuplicateRowLabel(String),
    #[error("between 1 and {MAX_ROWS} rows can be generated, got {0}")]
    RowCount(usize),
    #[error("invalid item id: {0:?}")]
    InvalidItemId(String),
    #[error("item {0} appears more than once")]
    DuplicateItem(String),
    #[error("item {item_id} has {count} alternatives, expected 2 to {max}")]
    AlternativeCount { item_id: String, count: usize, max: usize },
    #[error("item {item_id} must have exactly one correct alternative, found {count}")]
    CorrectAlternativeCount { item_id: String, count: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct VersionOptions {
    #[serde(default)]
    pub(crate) randomize_items: bool,
    #[serde(default)]
    pub(crate) randomize_alternatives: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct VersionedItem {
    pub(crate) item_id: String,
    pub(crate) number: u32,
    pub(crate) kind: ItemKind,
    pub(crate) alternatives: Vec<Alternative>,
}

impl VersionedItem {
    pub(crate) fn correct_slot(&self) -> Option<usize> {
        self.alternatives.iter().position(|alternative| alternative.is_correct)
    }

    pub(crate) fn alternative_at(&self, slot: usize) -> Option<&Alternative> {
        self.alternatives.get(slot)
    }

    fn key_entry(&self) -> Result<KeyEntry, VersionError> {
        match self.kind {
            ItemKind::MultipleChoice => {
                let slot = self.correct_slot().ok_or_else(|| {
                    VersionError::CorrectAlternativeCount {
                        item_id: self.item_id.clone(),
                        count: 0,
                    }
                })?;
                Ok(KeyEntry::Choice(slot_letter(slot)))
            }
            // Authored order is kept for true/false: the first alternative is "true".
            ItemKind::TrueFalse => Ok(KeyEntry::TrueFalse(
                self.alternatives
                    .first()
                    .map(|alternative| alternative.is_correct)
                    .unwrap_or(false),
            )),
            ItemKind::Open => Ok(KeyEntry::Open),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ExamVersion {
    pub(crate) row_label: String,
    #[serde(skip)]
    pub(crate) seed: String,
    pub(crate) items: Vec<VersionedItem>,
}

impl ExamVersion {
    pub(crate) fn scoreable_items(&self) -> impl Iterator<Item = &VersionedItem> {
        self.items.iter().filter(|item| item.kind == ItemKind::MultipleChoice)
    }

    pub(crate) fn scoreable_count(&self) -> usize {
        self.scoreable_items().count()
    }

    pub(crate) fn answer_key(&self) -> Result<AnswerKey, VersionError> {
        self.items.iter().map(|item| item.key_entry().map(|entry| (item.number, entry))).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyEntry {
    Choice(char),
    TrueFalse(bool),
    Open,
}

impl fmt::Display for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEntry::Choice(letter) => write!(f, "{letter}"),
            KeyEntry::TrueFalse(true) => f.write_str("V"),
            KeyEntry::TrueFalse(false) => f.write_str("F"),
            KeyEntry::Open => write!(f, "{OPEN_MARKER}"),
        }
    }
}

impl Serialize for KeyEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub(crate) type AnswerKey = BTreeMap<u32, KeyEntry>;
pub(crate) type AnswerKeySet = BTreeMap<String, AnswerKey>;

pub(crate) fn slot_letter(slot: usize) -> char {
    (b'A' + slot as u8) as char
}

pub(crate) fn row_labels(count: usize) -> Result<Vec<String>, VersionError> {
    if count == 0 || count > MAX_ROWS {
        return Err(VersionError::RowCount(count));
    }
    Ok((0..count).map(|index| slot_letter(index).to_string()).collect())
}

pub(crate) fn validate_seed(seed: &str) -> Result<(), VersionError> {
    if seed.is_empty() {
        return Err(VersionError::EmptySeed);
    }
    Ok(())
}

pub(crate) fn validate_row_label(row_label: &str) -> Result<(), VersionError> {
    let trimmed = row_label.trim();
    if trimmed.is_empty()
        || trimmed != row_label
        || row_label.len() > MAX_ROW_LABEL_LEN
        || row_label.contains(PAYLOAD_DELIMITER)
    {
        return Err(VersionError::InvalidRowLabel(row_label.to_string()));
    }
    Ok(())
}

pub(crate) fn validate_items(
    items: &[AssessmentItem],
    max_alternatives: usize,
) -> Result<(), VersionError> {
    let mut seen = HashSet::new();
    for item in items {
        if item.id.trim().is_empty() || item.id.contains(PAYLOAD_DELIMITER) {
            return Err(VersionError::InvalidItemId(item.id.clone()));
        }
        if !seen.insert(item.id.as_str()) {
            return Err(VersionError::DuplicateItem(item.id.clone()));
        }

        let count = item.alternatives.len();
        let correct = item.alternatives.iter().filter(|alternative| alternative.is_correct).count();
        match item.kind {
            ItemKind::MultipleChoice => {
                if !(2..=max_alternatives).contains(&count) {
                    return Err(VersionError::AlternativeCount {
                        item_id: item.id.clone(),
                        count,
                        max: max_alternatives,
                    });
                }
                if correct != 1 {
                    return Err(VersionError::CorrectAlternativeCount {
                        item_id: item.id.clone(),
                        count: correct,
                    });
                }
            }
            ItemKind::TrueFalse => {
                if count != 2 {
                    return Err(VersionError::AlternativeCount {
                        item_id: item.id.clone(),
                        count,
                        max: 2,
                    });
                }
                if correct != 1 {
                    return Err(VersionError::CorrectAlternativeCount {
                        item_id: item.id.clone(),
                        count: correct,
                    });
                }
            }
            ItemKind::Open => {}
        }
    }
    Ok(())
}

pub(crate) fn generate_version(
    items: &[AssessmentItem],
    options: VersionOptions,
    seed: &str,
    row_label: &str,
) -> Result<ExamVersion, VersionError> {
    validate_seed(seed)?;
    validate_row_label(row_label)?;

    let mut ordered = in_display_order(items);
    if options.randomize_items {
        ordered = permute(&seed_material(&[seed, row_label]), &ordered);
    }

    let mut balancer = options
        .randomize_alternatives
        .then(|| SlotBalancer::new(seed, row_label, &ordered));

    let versioned = ordered
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let alternatives = match (&mut balancer, item.kind) {
                (Some(balancer), ItemKind::MultipleChoice) => {
                    let shuffled =
                        permute(&seed_material(&[seed, row_label, &item.id]), &item.alternatives);
                    balancer.place_correct(shuffled)
                }
                _ => item.alternatives,
            };
            VersionedItem {
                item_id: item.id,
                number: index as u32 + 1,
                kind: item.kind,
                alternatives,
            }
        })
        .collect();

    Ok(ExamVersion { row_label: row_label.to_string(), seed: seed.to_string(), items: versioned })
}

pub(crate) fn generate_answer_keys(
    items: &[AssessmentItem],
    options: VersionOptions,
    seed: &str,
    row_labels: &[String],
) -> Result<(Vec<ExamVersion>, AnswerKeySet), VersionError> {
    if row_labels.is_empty() || row_labels.len() > MAX_ROWS {
        return Err(VersionError::RowCount(row_labels.len()));
    }
    let mut seen = HashSet::new();
    for row in row_labels {
        if !seen.insert(row.as_str()) {
            return Err(VersionError::DuplicateRowLabel(row.clone()));
        }
    }

    let mut versions = Vec::with_capacity(row_labels.len());
    let mut keys = AnswerKeySet::new();
    for row in row_labels {
        let version = generate_version(items, options, seed, row)?;
        keys.insert(row.clone(), version.answer_key()?);
        versions.push(version);
    }
    Ok((versions, keys))
}

// Inside a full block every slot holds the correct answer exactly once.
struct SlotBalancer {
    seed: String,
    row_label: String,
    block_width: usize,
    position: usize,
    targets: Vec<usize>,
}

impl SlotBalancer {
    fn new(seed: &str, row_label: &str, items: &[AssessmentItem]) -> Self {
        let block_width = items
            .iter()
            .filter(|item| item.kind == ItemKind::MultipleChoice)
            .map(|item| item.alternatives.len())
            .max()
            .unwrap_or(1)
            .max(1);
        Self {
            seed: seed.to_string(),
            row_label: row_label.to_string(),
            block_width,
            position: 0,
            targets: Vec::new(),
        }
    }

    fn place_correct(&mut self, mut alternatives: Vec<Alternative>) -> Vec<Alternative> {
        let offset = self.position % self.block_width;
        if offset == 0 {
            let block = (self.position / self.block_width).to_string();
            let slots: Vec<usize> = (0..self.block_width).collect();
            self.targets =
                permute(
                    &seed_material(&[&self.seed, &self.row_label, BALANCE_TAG, &block]),
                    &slots,
                );
        }
        self.position += 1;

        let count = alternatives.len();
        if count == 0 {
            return alternatives;
        }
        if let Some(current) = alternatives.iter().position(|alternative| alternative.is_correct) {
            let target = self.targets[offset] % count;
            alternatives.rotate_right((target + count - current) % count);
        }
        alternatives
    }
}
