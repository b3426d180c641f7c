//! Host variables and their CSV definitions.
//!
//! A definition line has the fields
//!
//! ```text
//! id,name,unit,flags,description,type,conversion,round,default,min,max,state=value,...
//! ```
//!
//! `name` is a `|` separated path, `flags` a string of flag letters
//! (see [`VariableFlags`]), `type` a value type name (`INTEGER`, `FLOAT`,
//! `STRING`, ...).

use bitflags::bitflags;

use crate::script::value::{parse_c_long, unescape, Value, ValueType};

bitflags! {
    /// Variable flags and their definition letters.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct VariableFlags: u32 {
        /// `R`: only the owner changes the value.
        const READONLY  = 1 << 0;
        /// `A`: archived by clients.
        const ARCHIVE   = 1 << 1;
        /// `S`: shared with clients.
        const SHARE     = 1 << 2;
        /// `L`: link variable.
        const LINK      = 1 << 3;
        /// `F`: function variable.
        const FUNCTION  = 1 << 4;
        /// `P`: parameter.
        const PARAMETER = 1 << 5;
        /// `H`: hidden from listings.
        const HIDDEN    = 1 << 6;
        /// `E`: may be exported.
        const EXPORT    = 1 << 7;
        /// `W`: writeable through global references.
        const WRITEABLE = 1 << 8;
    }
}

const FLAG_LETTERS: &[(char, VariableFlags)] = &[
    ('R', VariableFlags::READONLY),
    ('A', VariableFlags::ARCHIVE),
    ('S', VariableFlags::SHARE),
    ('L', VariableFlags::LINK),
    ('F', VariableFlags::FUNCTION),
    ('P', VariableFlags::PARAMETER),
    ('H', VariableFlags::HIDDEN),
    ('E', VariableFlags::EXPORT),
    ('W', VariableFlags::WRITEABLE),
];

impl VariableFlags {
    /// Flags from their letters; unknown letters are ignored.
    pub fn from_letters(letters: &str) -> Self {
        letters
            .chars()
            .filter_map(|c| FLAG_LETTERS.iter().find(|(l, _)| *l == c).map(|(_, f)| *f))
            .fold(VariableFlags::empty(), |acc, f| acc | f)
    }

    pub fn letters(self) -> String {
        FLAG_LETTERS
            .iter()
            .filter(|(_, f)| self.contains(*f))
            .map(|(l, _)| *l)
            .collect()
    }
}

// ── Definition ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid id field {0:?}")]
    BadId(String),
    #[error("id zero is reserved")]
    ZeroId,
    #[error("field {field} {text:?} does not convert to {value_type}")]
    BadValue {
        field: &'static str,
        text: String,
        value_type: ValueType,
    },
    #[error("id 0x{0:x} already defined")]
    Duplicate(i64),
}

/// A named value of a variable, e.g. `on=1`.
#[derive(Debug, Clone)]
pub struct VarState {
    pub name: String,
    pub value: Value,
}

/// Parsed variable definition.
#[derive(Debug, Clone)]
pub struct Definition {
    pub id: i64,
    pub name: String,
    pub unit: String,
    pub flags: VariableFlags,
    pub description: String,
    pub value_type: ValueType,
    pub conversion: String,
    pub round: Value,
    pub default: Value,
    pub min: Value,
    pub max: Value,
    pub states: Vec<VarState>,
}

/// Parse a number field the C way; the whole field must be consumed.
pub(crate) fn parse_id(text: &str) -> Result<i64, DefinitionError> {
    let text = text.trim();
    let (id, used) = parse_c_long(text);
    if used != text.len() || text.is_empty() {
        return Err(DefinitionError::BadId(text.to_owned()));
    }
    Ok(id)
}

pub(crate) fn typed(field: &'static str, text: &str, value_type: ValueType) -> Result<Value, DefinitionError> {
    let mut v = Value::from(text);
    if v.set_type(value_type) {
        Ok(v)
    } else {
        Err(DefinitionError::BadValue {
            field,
            text: text.to_owned(),
            value_type,
        })
    }
}

impl Definition {
    pub fn parse(csv: &str) -> Result<Definition, DefinitionError> {
        let fields: Vec<&str> = csv.trim_end_matches(['\r', '\n']).split(',').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("");
        let id = parse_id(field(0))?;
        if id == 0 {
            return Err(DefinitionError::ZeroId);
        }
        let value_type = match ValueType::from_name(field(5)) {
            ValueType::Invalid | ValueType::Undefined => ValueType::String,
            t => t,
        };
        let unit = field(2).to_owned();
        let default_text = if value_type == ValueType::String && unit.contains('M') {
            unescape(field(8))
        } else {
            field(8).to_owned()
        };
        let mut states = Vec::new();
        for &text in fields.iter().skip(11).take_while(|s| !s.is_empty()) {
            let (name, value) = text.split_once('=').unwrap_or((text, ""));
            states.push(VarState {
                name: name.to_owned(),
                value: typed("state", value, value_type)?,
            });
        }
        Ok(Definition {
            id,
            name: field(1).to_owned(),
            unit,
            flags: VariableFlags::from_letters(field(3)),
            description: unescape(field(4)),
            value_type,
            conversion: field(6).to_owned(),
            round: typed("round", field(7), value_type)?,
            default: typed("default", &default_text, value_type)?,
            min: typed("min", field(9), value_type)?,
            max: typed("max", field(10), value_type)?,
            states,
        })
    }

    /// The definition back in CSV form.
    pub fn to_csv(&self) -> String {
        let mut fields = vec![
            format!("0x{:x}", self.id),
            self.name.clone(),
            self.unit.clone(),
            self.flags.letters(),
            self.description.clone(),
            self.value_type.name().to_owned(),
            self.conversion.clone(),
            self.round.get_string(),
            self.default.get_string(),
            self.min.get_string(),
            self.max.get_string(),
        ];
        fields.extend(self.states.iter().map(|s| format!("{}={}", s.name, s.value.get_string())));
        fields.join(",")
    }
}

// ── Variable ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Variable {
    def: Definition,
    cur: Value,
    cur_flags: VariableFlags,
}

impl Variable {
    pub fn new(def: Definition) -> Self {
        Variable {
            cur: def.default.clone(),
            cur_flags: def.flags,
            def,
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.def
    }

    pub fn id(&self) -> i64 {
        self.def.id
    }

    /// Name path.  `levels > 0` keeps that many trailing segments,
    /// `levels < 0` drops that many leading ones; segments of a partial
    /// name are joined with spaces.
    pub fn name(&self, levels: i32) -> String {
        super::path_levels(&self.def.name, levels)
    }

    pub fn unit(&self) -> &str {
        &self.def.unit
    }

    pub fn value_type(&self) -> ValueType {
        self.def.value_type
    }

    pub fn flags(&self) -> VariableFlags {
        self.def.flags
    }

    pub fn cur_flags(&self) -> VariableFlags {
        self.cur_flags
    }

    pub fn round(&self) -> &Value {
        &self.def.round
    }

    pub fn default_value(&self) -> &Value {
        &self.def.default
    }

    pub fn min(&self) -> &Value {
        &self.def.min
    }

    pub fn max(&self) -> &Value {
        &self.def.max
    }

    pub fn cur(&self) -> &Value {
        &self.cur
    }

    pub fn is_number(&self) -> bool {
        matches!(self.def.value_type, ValueType::Integer | ValueType::Float)
    }

    /// Store a new current value: converted to the variable type, clamped
    /// to `[min, max]` when those differ, rounded to `round`.  `None` when
    /// the value does not convert, otherwise whether it changed.
    pub fn set_cur(&mut self, value: &Value) -> Option<bool> {
        let mut v = value.deref_value();
        if !v.set_type(self.def.value_type) {
            return None;
        }
        if self.is_number() {
            if self.def.max != self.def.min {
                if v > self.def.max {
                    v = self.def.max.clone();
                }
                if v < self.def.min {
                    v = self.def.min.clone();
                }
            }
            if !self.def.round.is_zero() {
                v.round(&self.def.round);
            }
        }
        let changed = self.cur.value_type() != v.value_type() || self.cur != v;
        self.cur = v;
        Some(changed)
    }

    /// The state name for the current value, or its text.
    pub fn cur_string(&self) -> String {
        self.def
            .states
            .iter()
            .find(|s| s.value == self.cur)
            .map_or_else(|| self.cur.get_string(), |s| s.name.clone())
    }

    /// Replace the current flags; returns whether they changed.
    pub fn update_flags(&mut self, flags: VariableFlags) -> bool {
        let changed = self.cur_flags != flags;
        self.cur_flags = flags;
        changed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SPEED: &str = "0x100,Drive|Axis|Speed,m/s,RAE,Axis speed,FLOAT,,0.5,1,0,10";
    const MODE: &str = "0x101,Drive|Mode,,S,Mode,INTEGER,,,0,0,2,off=0,on=1,auto=2";

    #[test]
    fn flag_letters() {
        let f = VariableFlags::from_letters("RxE");
        assert_eq!(f, VariableFlags::READONLY | VariableFlags::EXPORT);
        assert_eq!(f.letters(), "RE");
        assert_eq!(VariableFlags::from_letters("").letters(), "");
    }

    #[test]
    fn parse_definition() {
        let d = Definition::parse(SPEED).unwrap();
        assert_eq!(d.id, 0x100);
        assert_eq!(d.unit, "m/s");
        assert_eq!(d.value_type, ValueType::Float);
        assert!(matches!(d.default, Value::Float(x) if x == 1.0));
        assert!(matches!(d.max, Value::Float(x) if x == 10.0));
        let m = Definition::parse(MODE).unwrap();
        assert_eq!(m.states.len(), 3);
        assert_eq!(m.states[2].name, "auto");
        assert!(matches!(m.states[2].value, Value::Int(2)));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Definition::parse("zz,a").unwrap_err(), DefinitionError::BadId("zz".into()));
        assert_eq!(Definition::parse("0,a").unwrap_err(), DefinitionError::ZeroId);
        assert!(matches!(
            Definition::parse("1,a,,,,INTEGER,,,x1").unwrap_err(),
            DefinitionError::BadValue { field: "default", .. }
        ));
    }

    #[test]
    fn csv_round_trip_keeps_fields() {
        let d = Definition::parse(MODE).unwrap();
        let again = Definition::parse(&d.to_csv()).unwrap();
        assert_eq!(again.name, d.name);
        assert_eq!(again.states.len(), 3);
        assert_eq!(again.flags, d.flags);
    }

    #[test]
    fn name_levels() {
        let v = Variable::new(Definition::parse(SPEED).unwrap());
        assert_eq!(v.name(0), "Drive|Axis|Speed");
        assert_eq!(v.name(1), "Speed");
        assert_eq!(v.name(2), "Axis Speed");
        assert_eq!(v.name(9), "Drive Axis Speed");
        assert_eq!(v.name(-1), "Axis Speed");
    }

    #[test]
    fn set_cur_clamps_and_rounds() {
        let mut v = Variable::new(Definition::parse(SPEED).unwrap());
        assert_eq!(v.set_cur(&Value::Float(3.3)), Some(true));
        assert!(matches!(v.cur(), Value::Float(x) if *x == 3.5));
        assert_eq!(v.set_cur(&Value::from("3.4")), Some(false));
        v.set_cur(&Value::Int(99));
        assert!(matches!(v.cur(), Value::Float(x) if *x == 10.0));
        assert_eq!(v.set_cur(&Value::from("fast")), None);
    }

    #[test]
    fn state_names() {
        let mut v = Variable::new(Definition::parse(MODE).unwrap());
        assert_eq!(v.cur_string(), "off");
        v.set_cur(&Value::Int(2));
        assert_eq!(v.cur_string(), "auto");
    }

    #[test]
    fn flags_update() {
        let mut v = Variable::new(Definition::parse(MODE).unwrap());
        assert_eq!(v.cur_flags(), VariableFlags::SHARE);
        assert!(v.update_flags(VariableFlags::SHARE | VariableFlags::HIDDEN));
        assert!(!v.update_flags(VariableFlags::SHARE | VariableFlags::HIDDEN));
        assert_eq!(v.flags(), VariableFlags::SHARE);
    }
}
