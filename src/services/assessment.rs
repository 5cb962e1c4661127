use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ItemKind {
    MultipleChoice,
    TrueFalse,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Alternative {
    pub(crate) id: String,
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
    #[serde(default)]
    pub(crate) order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AssessmentItem {
    pub(crate) id: String,
    pub(crate) display_order: i32,
    pub(crate) kind: ItemKind,
    #[serde(default)]
    pub(crate) statement: String,
    #[serde(default)]
    pub(crate) alternatives: Vec<Alternative>,
}

impl AssessmentItem {
    pub(crate) fn is_scoreable(&self) -> bool {
        self.kind == ItemKind::MultipleChoice
    }

    pub(crate) fn correct_index(&self) -> Option<usize> {
        self.alternatives.iter().position(|alternative| alternative.is_correct)
    }
}

pub(crate) fn in_display_order(items: &[AssessmentItem]) -> Vec<AssessmentItem> {
    let mut ordered = items.to_vec();
    ordered.sort_by_key(|item| item.display_order);
    for item in &mut ordered {
        item.alternatives.sort_by_key(|alternative| alternative.order);
    }
    ordered
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn multiple_choice(
        id: &str,
        order: i32,
        count: usize,
        correct: usize,
    ) -> AssessmentItem {
        AssessmentItem {
            id: id.to_string(),
            display_order: order,
            kind: ItemKind::MultipleChoice,
            statement: format!("Question {id}"),
            alternatives: (0..count)
                .map(|index| Alternative {
                    id: format!("{id}-alt{index}"),
                    text: format!("Option {index}"),
                    is_correct: index == correct,
                    order: index as i32,
                })
                .collect(),
        }
    }

    pub(crate) fn true_false(id: &str, order: i32, answer: bool) -> AssessmentItem {
        AssessmentItem {
            id: id.to_string(),
            display_order: order,
            kind: ItemKind::TrueFalse,
            statement: format!("Statement {id}"),
            alternatives: vec![
                Alternative {
                    id: format!("{id}-v"),
                    text: "Verdadeiro".to_string(),
                    is_correct: answer,
                    order: 0,
                },
                Alternative {
                    id: format!("{id}-f"),
                    text: "Falso".to_string(),
                    is_correct: !answer,
                    order: 1,
                },
            ],
        }
    }

    pub(crate) fn open(id: &str, order: i32) -> AssessmentItem {
        AssessmentItem {
            id: id.to_string(),
            display_order: order,
            kind: ItemKind::Open,
            statement: format!("Discuss {id}"),
            alternatives: Vec::new(),
        }
    }

    pub(crate) fn exam_2024() -> Vec<AssessmentItem> {
        vec![multiple_choice("q1", 1, 4, 0), multiple_choice("q2", 2, 4, 2), true_false("q3", 3, true)]
    }
}
