//! Host result data: blocks of integer samples with range requests.
//!
//! Definition fields:
//!
//! ```text
//! id,name,flags,description,type,block_size,segment_size,significant_bits,offset
//! ```

use bitflags::bitflags;

use super::variable::{parse_id, DefinitionError};
use super::LinkId;
use crate::script::value::unescape;

bitflags! {
    /// Result flags and their definition letters.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct ResultFlags: u32 {
        /// `R`: recycled by the owner.
        const RECYCLE = 1 << 0;
        /// `A`: selected for archiving.
        const ARCHIVE = 1 << 1;
        /// `S`: shared with clients.
        const SHARE   = 1 << 2;
        /// `H`: hidden from listings.
        const HIDDEN  = 1 << 3;
    }
}

const FLAG_LETTERS: &[(char, ResultFlags)] = &[
    ('R', ResultFlags::RECYCLE),
    ('A', ResultFlags::ARCHIVE),
    ('S', ResultFlags::SHARE),
    ('H', ResultFlags::HIDDEN),
];

impl ResultFlags {
    pub fn from_letters(letters: &str) -> Self {
        letters
            .chars()
            .filter_map(|c| FLAG_LETTERS.iter().find(|(l, _)| *l == c).map(|(_, f)| *f))
            .fold(ResultFlags::empty(), |acc, f| acc | f)
    }

    pub fn letters(self) -> String {
        FLAG_LETTERS
            .iter()
            .filter(|(_, f)| self.contains(*f))
            .map(|(l, _)| *l)
            .collect()
    }
}

/// Element type of a result block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultType {
    #[default]
    Invalid,
    String,
    Int8,
    Int16,
    Int32,
    Int64,
}

impl ResultType {
    pub fn name(self) -> &'static str {
        match self {
            ResultType::Invalid => "INVALID",
            ResultType::String => "STRING",
            ResultType::Int8 => "INT8",
            ResultType::Int16 => "INT16",
            ResultType::Int32 => "INT32",
            ResultType::Int64 => "INT64",
        }
    }

    pub fn from_name(name: &str) -> ResultType {
        let upper = name.trim().to_ascii_uppercase();
        [
            ResultType::String,
            ResultType::Int8,
            ResultType::Int16,
            ResultType::Int32,
            ResultType::Int64,
        ]
        .into_iter()
        .find(|t| t.name() == upper)
        .unwrap_or(ResultType::Invalid)
    }

    pub fn bits(self) -> u32 {
        match self {
            ResultType::Int8 => 8,
            ResultType::Int16 => 16,
            ResultType::Int32 => 32,
            ResultType::Int64 => 64,
            ResultType::Invalid | ResultType::String => 0,
        }
    }
}

// ── Definition ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ResultDefinition {
    pub id: i64,
    pub name: String,
    pub flags: ResultFlags,
    pub description: String,
    pub result_type: ResultType,
    pub block_size: usize,
    pub segment_size: usize,
    pub significant_bits: u32,
    pub offset: i64,
}

fn count(text: &str) -> usize {
    parse_id(text).ok().and_then(|n| usize::try_from(n).ok()).unwrap_or(0)
}

impl ResultDefinition {
    pub fn parse(csv: &str) -> Result<ResultDefinition, DefinitionError> {
        let fields: Vec<&str> = csv.trim_end_matches(['\r', '\n']).split(',').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("");
        let id = parse_id(field(0))?;
        if id == 0 {
            return Err(DefinitionError::ZeroId);
        }
        let result_type = ResultType::from_name(field(4));
        let bits = count(field(7)) as u32;
        Ok(ResultDefinition {
            id,
            name: field(1).to_owned(),
            flags: ResultFlags::from_letters(field(2)),
            description: unescape(field(3)),
            result_type,
            block_size: count(field(5)).max(1),
            segment_size: count(field(6)),
            significant_bits: if bits == 0 { result_type.bits() } else { bits.min(result_type.bits()) },
            offset: parse_id(field(8)).unwrap_or(0),
        })
    }
}

// ── ResultData ────────────────────────────────────────────────────────────────

/// A range a client asked for and has not received yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub link: LinkId,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct ResultData {
    def: ResultDefinition,
    blocks: Vec<i64>,
    requests: Vec<PendingRequest>,
}

impl ResultData {
    pub fn new(def: ResultDefinition) -> Self {
        ResultData {
            def,
            blocks: Vec::new(),
            requests: Vec::new(),
        }
    }

    pub fn definition(&self) -> &ResultDefinition {
        &self.def
    }

    pub fn id(&self) -> i64 {
        self.def.id
    }

    /// Name path with the same `levels` rule as variables.
    pub fn name(&self, levels: i32) -> String {
        super::path_levels(&self.def.name, levels)
    }

    pub fn flags(&self) -> ResultFlags {
        self.def.flags
    }

    pub fn value_offset(&self) -> i64 {
        self.def.offset
    }

    /// Number of distinct sample values, 0 when unbounded.
    pub fn value_range(&self) -> i64 {
        match self.def.significant_bits {
            1..=62 => 1i64 << self.def.significant_bits,
            _ => 0,
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Sample `index` with the value offset applied.
    pub fn data(&self, index: usize) -> Option<i64> {
        self.blocks.get(index).map(|raw| raw - self.def.offset)
    }

    pub(crate) fn append(&mut self, raw: &[i64]) {
        self.blocks.extend_from_slice(raw);
    }

    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn is_accessible(&self, offset: usize, size: usize) -> bool {
        offset.checked_add(size).is_some_and(|end| end <= self.blocks.len())
    }

    pub(crate) fn add_request(&mut self, request: PendingRequest) {
        if !self.requests.contains(&request) {
            self.requests.push(request);
        }
    }

    /// Remove and return the requests the stored blocks now satisfy.
    pub(crate) fn take_satisfied(&mut self) -> Vec<PendingRequest> {
        let len = self.blocks.len();
        let (done, open): (Vec<_>, Vec<_>) = self
            .requests
            .drain(..)
            .partition(|r| r.offset + r.size <= len);
        self.requests = open;
        done
    }

    pub(crate) fn drop_requests_of(&mut self, link: LinkId) {
        self.requests.retain(|r| r.link != link);
    }

    pub fn pending(&self) -> &[PendingRequest] {
        &self.requests
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
