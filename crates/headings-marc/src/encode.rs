//! Output encodings of a subject field: the mnemonic line catalogers read
//! and MARC-in-JSON for downstream record tools.
use serde_json::{json, Map, Value};

use headings_core::{Error, FieldTag, Result, Subfield, SubfieldCode, SubjectField};

/// `650 _0 $a China $x History $0 http://...`
pub fn mnemonic(field: &SubjectField) -> String {
    field.to_string()
}

/// `{"650": {"ind1": " ", "ind2": "0", "subfields": [{"a": "China"}, ...]}}`
pub fn to_marc_json(field: &SubjectField) -> Value {
    let subfields: Vec<Value> = field
        .subfields
        .iter()
        .map(|sf| {
            let mut pair = Map::new();
            pair.insert(sf.code.as_char().to_string(), Value::String(sf.value.clone()));
            Value::Object(pair)
        })
        .collect();
    let body = json!({
        "ind1": field.indicator_1.to_string(),
        "ind2": field.indicator_2.to_string(),
        "subfields": subfields,
    });
    let mut out = Map::new();
    out.insert(field.field_tag.as_str().to_string(), body);
    Value::Object(out)
}

/// The record-level part of a subject field: tag, indicators, subfields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedField {
    pub field_tag: FieldTag,
    pub indicator_1: char,
    pub indicator_2: char,
    pub subfields: Vec<Subfield>,
}

impl From<&SubjectField> for EncodedField {
    fn from(field: &SubjectField) -> Self {
        Self {
            field_tag: field.field_tag,
            indicator_1: field.indicator_1,
            indicator_2: field.indicator_2,
            subfields: field.subfields.clone(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidInput(format!("MARC-in-JSON: {}", msg.into()))
}

fn single_char(value: Option<&Value>, name: &str) -> Result<char> {
    let s = value.and_then(Value::as_str).ok_or_else(|| invalid(format!("missing {name}")))?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(invalid(format!("{name} must be one character, got '{s}'"))),
    }
}

pub fn from_marc_json(value: &Value) -> Result<EncodedField> {
    let object = value.as_object().ok_or_else(|| invalid("expected an object"))?;
    if object.len() != 1 {
        return Err(invalid(format!("expected exactly one field, got {}", object.len())));
    }
    let Some((tag, body)) = object.iter().next() else {
        return Err(invalid("expected exactly one field"));
    };
    let field_tag = FieldTag::from_tag(tag).ok_or_else(|| invalid(format!("unsupported tag '{tag}'")))?;
    let indicator_1 = single_char(body.get("ind1"), "ind1")?;
    let indicator_2 = single_char(body.get("ind2"), "ind2")?;
    let raw = body.get("subfields").and_then(Value::as_array).ok_or_else(|| invalid("missing subfields"))?;

    let mut subfields = Vec::with_capacity(raw.len());
    for entry in raw {
        let pair = entry.as_object().filter(|o| o.len() == 1).ok_or_else(|| invalid("malformed subfield"))?;
        for (code, value) in pair {
            let code = code
                .chars()
                .next()
                .filter(|_| code.chars().count() == 1)
                .and_then(SubfieldCode::from_char)
                .ok_or_else(|| invalid(format!("unsupported subfield code '{code}'")))?;
            let value = value.as_str().ok_or_else(|| invalid("subfield value must be a string"))?;
            subfields.push(Subfield::new(code, value));
        }
    }
    Ok(EncodedField { field_tag, indicator_1, indicator_2, subfields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_tags_and_codes() {
        let bad_tag = json!({"245": {"ind1": " ", "ind2": "0", "subfields": [{"a": "x"}]}});
        assert!(from_marc_json(&bad_tag).is_err());
        let bad_code = json!({"650": {"ind1": " ", "ind2": "0", "subfields": [{"q": "x"}]}});
        assert!(from_marc_json(&bad_code).is_err());
        let bad_ind = json!({"650": {"ind1": "", "ind2": "0", "subfields": []}});
        assert!(from_marc_json(&bad_ind).is_err());
    }
}
