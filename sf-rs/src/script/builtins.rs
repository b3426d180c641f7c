//! Identifiers every [`ScriptEngine`](super::engine::ScriptEngine) exposes:
//! typedefs, the `PI` constant and the math and string functions.
//!
//! Parameter counts are checked by the engine before [`get_set_value`] runs,
//! so the functions here index their arguments without further checks.

use std::f64::consts::PI;

use super::error::ErrorKind;
use super::object::{lookup, table_names, IdEntry, IdInfo, IdKind, Owner};
use super::value::{Value, ValueType};

// Dispatch keys live below this base so they never collide with scope keys.
const BASE: i32 = -20000;

const INT: i32 = BASE - 1;
const FLOAT: i32 = BASE - 2;
const STRING: i32 = BASE - 3;
const UNDEF: i32 = BASE - 4;
const OBJECT: i32 = BASE - 5;

const SUBSTR: i32 = BASE - 13;
const STRLEN: i32 = BASE - 14;
const FINDSTR: i32 = BASE - 15;
const STRIP: i32 = BASE - 16;
const TO_UPPER: i32 = BASE - 17;
const TO_LOWER: i32 = BASE - 18;

const CONST_PI: i32 = BASE - 20;
const SIN: i32 = BASE - 21;
const COS: i32 = BASE - 22;
const TAN: i32 = BASE - 23;
const ACOS: i32 = BASE - 24;
const ASIN: i32 = BASE - 25;
const ATAN: i32 = BASE - 26;
const ATAN2: i32 = BASE - 27;

const CMP: i32 = BASE - 31;

const CEIL: i32 = BASE - 41;
const FLOOR: i32 = BASE - 42;
const ABS: i32 = BASE - 43;
const ROUND: i32 = BASE - 44;
const MOD: i32 = BASE - 45;
const STR: i32 = BASE - 46;
const TO_INT: i32 = BASE - 47;
const TO_FLOAT: i32 = BASE - 48;

const LOG: i32 = BASE - 50;
const EXP: i32 = BASE - 51;
const LOG10: i32 = BASE - 52;
const LOGX: i32 = BASE - 53;
const POW: i32 = BASE - 54;
const SQRT: i32 = BASE - 55;

const ENGINE_INFO: &[IdEntry] = &[
    IdEntry::new(INT, IdKind::Typedef, "int", 0),
    IdEntry::new(FLOAT, IdKind::Typedef, "float", 0),
    IdEntry::new(STRING, IdKind::Typedef, "string", 0),
    IdEntry::new(UNDEF, IdKind::Typedef, "undef", 0),
    IdEntry::new(OBJECT, IdKind::Typedef, "object", 0),
    IdEntry::new(CONST_PI, IdKind::Constant, "PI", 0),
    IdEntry::new(SIN, IdKind::Function, "sin", 1),
    IdEntry::new(COS, IdKind::Function, "cos", 1),
    IdEntry::new(TAN, IdKind::Function, "tan", 1),
    IdEntry::new(ACOS, IdKind::Function, "acos", 1),
    IdEntry::new(ASIN, IdKind::Function, "asin", 1),
    IdEntry::new(ATAN, IdKind::Function, "atan", 1),
    IdEntry::new(ATAN2, IdKind::Function, "atan2", 2),
    IdEntry::new(CMP, IdKind::Function, "cmp", 3),
    IdEntry::new(ABS, IdKind::Function, "abs", 1),
    IdEntry::new(LOG, IdKind::Function, "log", 1),
    IdEntry::new(EXP, IdKind::Function, "exp", 1),
    IdEntry::new(LOGX, IdKind::Function, "logx", 2),
    IdEntry::new(LOG10, IdKind::Function, "log10", 1),
    IdEntry::new(POW, IdKind::Function, "pow", 2),
    IdEntry::new(SQRT, IdKind::Function, "sqrt", 1),
    IdEntry::new(CEIL, IdKind::Function, "ceil", 1),
    IdEntry::new(FLOOR, IdKind::Function, "floor", 1),
    IdEntry::new(ROUND, IdKind::Function, "round", 2),
    IdEntry::new(MOD, IdKind::Function, "mod", 2),
    IdEntry::new(STR, IdKind::Function, "str", 1),
    IdEntry::new(TO_INT, IdKind::Function, "to_int", 1),
    IdEntry::new(TO_FLOAT, IdKind::Function, "to_float", 1),
    IdEntry::new(SUBSTR, IdKind::Function, "substr", 3),
    IdEntry::new(STRLEN, IdKind::Function, "strlen", 1),
    IdEntry::new(FINDSTR, IdKind::Function, "findstr", 2),
    IdEntry::new(STRIP, IdKind::Function, "strip", 3),
    IdEntry::new(TO_UPPER, IdKind::Function, "to_upper", 1),
    IdEntry::new(TO_LOWER, IdKind::Function, "to_lower", 1),
];

pub fn get_info(name: &str) -> IdInfo {
    lookup(ENGINE_INFO, name, Owner::Engine)
}

pub fn info_names() -> Vec<String> {
    table_names(ENGINE_INFO)
}

/// Names of the given kind, e.g. all typedefs for a syntax highlighter.
pub fn names_of_kind(kind: IdKind) -> Vec<String> {
    ENGINE_INFO
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.name.to_owned())
        .collect()
}

/// The value type a typedef declares, `None` if `info` is not a builtin
/// typedef.
pub fn typedef_type(info: &IdInfo) -> Option<ValueType> {
    if info.owner != Owner::Engine || info.kind != IdKind::Typedef {
        return None;
    }
    match info.key {
        INT => Some(ValueType::Integer),
        FLOAT => Some(ValueType::Float),
        STRING => Some(ValueType::String),
        UNDEF => Some(ValueType::Undefined),
        OBJECT => Some(ValueType::Custom),
        _ => None,
    }
}

/// Read a builtin constant or call a builtin function.
pub fn get_set_value(
    info: &IdInfo,
    value: &mut Value,
    params: &[Value],
    set: bool,
) -> Result<(), ErrorKind> {
    match info.kind {
        IdKind::Constant if set => Err(ErrorKind::AssignConstant),
        IdKind::Constant => match info.key {
            CONST_PI => {
                value.assign(&Value::Float(PI));
                Ok(())
            }
            _ => Err(ErrorKind::UnknownConstant),
        },
        IdKind::Function => {
            value.set(call(info.key, params)?);
            Ok(())
        }
        IdKind::Variable => Err(ErrorKind::UnknownVariable),
        IdKind::Typedef => Err(ErrorKind::UnknownIdentifier),
        IdKind::Keyword | IdKind::Unknown => Err(ErrorKind::CompilerImplementationError),
    }
}

fn arg(params: &[Value], idx: usize) -> Value {
    params.get(idx).cloned().unwrap_or_default()
}

fn float(params: &[Value], idx: usize) -> f64 {
    arg(params, idx).get_float()
}

fn call(key: i32, params: &[Value]) -> Result<Value, ErrorKind> {
    let p0 = arg(params, 0);
    Ok(match key {
        // ── Math ─────────────────────────────────────────────────────────────
        SIN => Value::Float(p0.get_float().sin()),
        COS => Value::Float(p0.get_float().cos()),
        TAN => Value::Float(p0.get_float().tan()),
        ACOS => Value::Float(p0.get_float().acos()),
        ASIN => Value::Float(p0.get_float().asin()),
        ATAN => Value::Float(p0.get_float().atan()),
        ATAN2 => Value::Float(p0.get_float().atan2(float(params, 1))),
        LOG => Value::Float(p0.get_float().ln()),
        EXP => Value::Float(p0.get_float().exp()),
        LOG10 => Value::Float(p0.get_float().log10()),
        LOGX => Value::Float(float(params, 1).ln() / p0.get_float().ln()),
        POW => Value::Float(p0.get_float().powf(float(params, 1))),
        SQRT => Value::Float(p0.get_float().sqrt()),
        CMP => {
            let lo = arg(params, 1);
            let hi = arg(params, 2);
            Value::from(lo <= p0 && hi >= p0)
        }
        ABS => match p0.value_type() {
            ValueType::Integer => Value::Int(p0.get_integer().wrapping_abs()),
            _ => Value::Float(p0.get_float().abs()),
        },
        CEIL => match p0.value_type() {
            ValueType::Float => Value::Float(p0.get_float().ceil()),
            _ => p0,
        },
        FLOOR => match p0.value_type() {
            ValueType::Float => Value::Float(p0.get_float().floor()),
            _ => p0,
        },
        ROUND => {
            let step = match p0.value_type() {
                ValueType::Integer => Value::Int(arg(params, 1).get_integer().wrapping_abs()),
                _ => Value::Float(float(params, 1).abs()),
            };
            let mut v = p0.deref_value();
            v.round(&step);
            v
        }
        MOD => Value::Float(p0.get_float() % float(params, 1)),

        // ── Conversion ───────────────────────────────────────────────────────
        STR => {
            let mut v = p0.deref_value();
            v.set_type(ValueType::String);
            v
        }
        TO_INT => Value::Int(p0.get_integer()),
        TO_FLOAT => Value::Float(p0.get_float()),

        // ── Strings ──────────────────────────────────────────────────────────
        SUBSTR => {
            let s = p0.get_string();
            let bytes = s.as_bytes();
            let pos = arg(params, 1).get_integer();
            let len = arg(params, 2).get_integer();
            if pos < 0 || pos as usize > bytes.len() {
                Value::from("")
            } else {
                let start = pos as usize;
                let avail = bytes.len() - start;
                let take = if len < 0 { avail } else { (len as usize).min(avail) };
                Value::from(String::from_utf8_lossy(&bytes[start..start + take]).into_owned())
            }
        }
        STRLEN => Value::Int(p0.get_string().len() as i64),
        FINDSTR => {
            let hay = p0.get_string();
            let needle = arg(params, 1).get_string();
            Value::Int(hay.find(&needle).map_or(-1, |i| i as i64))
        }
        STRIP => match p0.value_type() {
            ValueType::String => {
                let s = p0.get_string();
                let chars: Vec<char> = arg(params, 1).get_string().chars().collect();
                let strip = |c: char| chars.contains(&c);
                let out = match arg(params, 2).get_integer() {
                    -1 => s.trim_start_matches(strip),
                    1 => s.trim_end_matches(strip),
                    _ => s.trim_matches(strip),
                };
                Value::from(out)
            }
            _ => p0.deref_value(),
        },
        TO_UPPER => Value::from(p0.get_string().to_ascii_uppercase()),
        TO_LOWER => Value::from(p0.get_string().to_ascii_lowercase()),
        _ => return Err(ErrorKind::UnknownFunction),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
