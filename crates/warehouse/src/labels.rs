//! Block label schemes.
//!
//! Block labels come from one sequence shared by every building of a
//! warehouse, so they are unique warehouse-wide. The scheme is fixed in the
//! configuration before the layout is generated.

use serde::{Deserialize, Serialize};

const ALPHABET_LEN: u32 = 26;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockLabelScheme {
    /// `A` through `Z`; at most 26 blocks per warehouse.
    #[default]
    SingleLetter,
    /// Bijective base-26: `A`..`Z`, `AA`, `AB`, .. `AZ`, `BA`, ..
    MultiLetter,
}

impl BlockLabelScheme {
    /// Number of labels the scheme can hand out, `None` when unbounded.
    pub fn capacity(self) -> Option<u32> {
        match self {
            BlockLabelScheme::SingleLetter => Some(ALPHABET_LEN),
            BlockLabelScheme::MultiLetter => None,
        }
    }

    /// Label at a zero-based position in the warehouse-wide sequence.
    pub fn label(self, index: u32) -> Option<String> {
        match self {
            BlockLabelScheme::SingleLetter if index < ALPHABET_LEN => {
                Some(letter(index).to_string())
            }
            BlockLabelScheme::SingleLetter => None,
            BlockLabelScheme::MultiLetter => Some(bijective_base26(index)),
        }
    }

    /// The label sequence in order. Ends after 26 labels for `SingleLetter`.
    pub fn labels(self) -> impl Iterator<Item = String> {
        (0u32..).map_while(move |index| self.label(index))
    }
}

fn letter(offset: u32) -> char {
    char::from(b'A' + (offset % ALPHABET_LEN) as u8)
}

fn bijective_base26(index: u32) -> String {
    let mut n = u64::from(index) + 1;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(letter((n % u64::from(ALPHABET_LEN)) as u32));
        n /= u64::from(ALPHABET_LEN);
    }
    out.iter().rev().collect()
}
