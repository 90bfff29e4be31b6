//! String built-ins

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::RwLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use super::{arg_int, arg_str, arg_usize};
use crate::error::TransformError;
use crate::value::stringify;

static REGEX_CACHE: Lazy<RwLock<HashMap<String, Regex>>> = Lazy::new(Default::default);

/// Compile a pattern once per process
pub(crate) fn regex(function: &str, pattern: &str) -> Result<Regex, TransformError> {
    if let Some(re) = REGEX_CACHE
        .read()
        .ok()
        .and_then(|cache| cache.get(pattern).cloned())
    {
        return Ok(re);
    }
    let re = Regex::new(pattern).map_err(|e| TransformError::invalid_argument(function, e))?;
    if let Ok(mut cache) = REGEX_CACHE.write() {
        cache.insert(pattern.to_string(), re.clone());
    }
    Ok(re)
}

pub(super) fn text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(stringify(other)),
    }
}

fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(super) fn titlecase(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = !c.is_alphanumeric();
        }
    }
    out
}

pub(super) fn capitalize(s: &str) -> String {
    upper_first(&s.to_lowercase())
}

/// Lowercases everything, then uppercases the first letter of each sentence
pub(super) fn sentence_case(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut capitalize_next = true;
    for c in lower.chars() {
        if capitalize_next && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
        if matches!(c, '.' | '!' | '?') {
            capitalize_next = true;
        }
    }
    out
}

pub(super) fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(super) fn regex_replace(
    function: &str,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    let re = regex(function, &arg_str(function, args, 0)?)?;
    let replacement = arg_str(function, args, 1)?;
    Ok(re
        .replace_all(&text(value), replacement.as_str())
        .into_owned()
        .into())
}

pub(super) fn regex_extract(
    function: &str,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    let re = regex(function, &arg_str(function, args, 0)?)?;
    let group = match args.get(1) {
        Some(_) => arg_usize(function, args, 1)?,
        None => 0,
    };
    let haystack = text(value);
    Ok(re
        .captures(&haystack)
        .and_then(|caps| caps.get(group))
        .map_or(Value::Null, |m| Value::from(m.as_str())))
}

pub(super) fn matches(
    function: &str,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    let re = regex(function, &arg_str(function, args, 0)?)?;
    if value.is_null() {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(re.is_match(&text(value))))
}

/// Python-style slice bounds over `len` items; negative positions count from the end
pub(super) fn slice_bounds(len: usize, start: i64, end: Option<i64>) -> (usize, usize) {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { (len_i + i).max(0) } else { i.min(len_i) };
        usize::try_from(i).unwrap_or(0)
    };
    let start = clamp(start);
    let end = end.map_or(len, clamp);
    (start, end.max(start))
}

pub(super) fn substring(
    function: &str,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    let start = arg_int(function, args, 0)?;
    let end = match args.get(1) {
        Some(_) => Some(arg_int(function, args, 1)?),
        None => None,
    };
    let chars: Vec<char> = text(value).chars().collect();
    let (from, to) = slice_bounds(chars.len(), start, end);
    Ok(chars[from..to].iter().collect::<String>().into())
}

fn fill_char(function: &str, args: &[Value], index: usize) -> Result<char, TransformError> {
    match args.get(index) {
        None => Ok(' '),
        Some(_) => arg_str(function, args, index)?.chars().next().ok_or_else(|| {
            TransformError::invalid_argument(function, "fill character must not be empty")
        }),
    }
}

pub(super) fn pad(
    function: &str,
    value: &Value,
    args: &[Value],
    left: bool,
) -> Result<Value, TransformError> {
    let width = arg_usize(function, args, 0)?;
    let fill = fill_char(function, args, 1)?;
    let s = text(value);
    let len = s.chars().count();
    if len >= width {
        return Ok(s.into_owned().into());
    }
    let padding: String = std::iter::repeat_n(fill, width - len).collect();
    let out = if left {
        format!("{padding}{s}")
    } else {
        format!("{s}{padding}")
    };
    Ok(out.into())
}

pub(super) fn split(
    function: &str,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    let delimiter = match args.first() {
        Some(_) => arg_str(function, args, 0)?,
        None => ",".to_string(),
    };
    let s = text(value);
    let parts: Vec<Value> = if delimiter.is_empty() {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        s.split(delimiter.as_str()).map(Value::from).collect()
    };
    Ok(Value::Array(parts))
}

pub(super) fn join(
    function: &str,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    let delimiter = match args.first() {
        Some(_) => arg_str(function, args, 0)?,
        None => ",".to_string(),
    };
    match value {
        Value::Array(items) => Ok(items
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(&delimiter)
            .into()),
        other => Ok(stringify(other).into()),
    }
}

pub(super) fn mask(function: &str, value: &Value, args: &[Value]) -> Result<Value, TransformError> {
    let visible = match args.first() {
        Some(_) => arg_usize(function, args, 0)?,
        None => 4,
    };
    let chars: Vec<char> = text(value).chars().collect();
    // Short values are masked entirely
    let hidden = if chars.len() <= visible {
        chars.len()
    } else {
        chars.len() - visible
    };
    let mut out: String = std::iter::repeat_n('*', hidden).collect();
    out.extend(&chars[hidden..]);
    Ok(out.into())
}

pub(super) fn hash(function: &str, value: &Value, args: &[Value]) -> Result<Value, TransformError> {
    let algorithm = match args.first() {
        Some(_) => arg_str(function, args, 0)?.to_ascii_lowercase(),
        None => "sha256".to_string(),
    };
    let input = text(value);
    let bytes = input.as_bytes();
    let digest = match algorithm.as_str() {
        "sha224" => hex::encode(Sha224::digest(bytes)),
        "sha256" => hex::encode(Sha256::digest(bytes)),
        "sha384" => hex::encode(Sha384::digest(bytes)),
        "sha512" => hex::encode(Sha512::digest(bytes)),
        other => {
            return Err(TransformError::invalid_argument(
                function,
                format!("unsupported algorithm '{other}'"),
            ));
        }
    };
    Ok(digest.into())
}

pub(super) fn base64_encode(value: &Value) -> String {
    STANDARD.encode(text(value).as_bytes())
}

pub(super) fn base64_decode(function: &str, value: &Value) -> Result<Value, TransformError> {
    let bytes = STANDARD
        .decode(text(value).trim())
        .map_err(|e| TransformError::conversion(function, e))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|e| TransformError::conversion(function, e))
}

pub(super) fn json_parse(function: &str, value: Value) -> Result<Value, TransformError> {
    match value {
        Value::String(s) => {
            serde_json::from_str(&s).map_err(|e| TransformError::conversion(function, e))
        }
        other => Ok(other),
    }
}

/// Fill `{}` placeholders in order, or `{n}` by position, where the piped
/// value is argument 0 and trailing step arguments follow it.
pub(super) fn template(
    function: &str,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    let format = arg_str(function, args, 0)?;
    let mut fill: Vec<&Value> = Vec::with_capacity(args.len());
    fill.push(value);
    fill.extend(&args[1..]);

    let mut out = String::with_capacity(format.len());
    let mut next = 0usize;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut index = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    index.push(c);
                }
                if !closed {
                    return Err(TransformError::invalid_argument(
                        function,
                        "unclosed '{' in template",
                    ));
                }
                let position = if index.trim().is_empty() {
                    next += 1;
                    next - 1
                } else {
                    index.trim().parse::<usize>().map_err(|_| {
                        TransformError::invalid_argument(
                            function,
                            format!("bad placeholder '{{{index}}}'"),
                        )
                    })?
                };
                let part = fill.get(position).ok_or_else(|| {
                    TransformError::invalid_argument(
                        function,
                        format!("placeholder {position} has no value"),
                    )
                })?;
                out.push_str(&stringify(part));
            }
            other => out.push(other),
        }
    }
    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("hello world. bye now", "Hello world. Bye now")]
    #[case("ALREADY LOUD! quiet?", "Already loud! Quiet?")]
    fn test_sentence_case(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sentence_case(input), expected);
    }

    #[rstest]
    #[case(5, 1, None, (1, 5))]
    #[case(5, -2, None, (3, 5))]
    #[case(5, 1, Some(-1), (1, 4))]
    #[case(5, 4, Some(2), (4, 4))]
    #[case(5, 9, None, (5, 5))]
    fn test_slice_bounds(
        #[case] len: usize,
        #[case] start: i64,
        #[case] end: Option<i64>,
        #[case] expected: (usize, usize),
    ) {
        assert_eq!(slice_bounds(len, start, end), expected);
    }

    #[test]
    fn test_substring_counts_chars() {
        assert_eq!(
            substring("substring", &json!("héllo"), &[json!(1), json!(3)]).unwrap(),
            json!("él")
        );
    }

    #[test]
    fn test_regex_extract_group() {
        let value = json!("order-1234-x");
        assert_eq!(
            regex_extract("regex_extract", &value, &[json!(r"order-(\d+)"), json!(1)]).unwrap(),
            json!("1234")
        );
        assert_eq!(
            regex_extract("regex_extract", &value, &[json!(r"zzz")]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_regex_replace_uses_dollar_groups() {
        assert_eq!(
            regex_replace(
                "regex_replace",
                &json!("2024-01-15"),
                &[json!(r"(\d+)-(\d+)-(\d+)"), json!("$3/$2/$1")]
            )
            .unwrap(),
            json!("15/01/2024")
        );
    }

    #[test]
    fn test_split_and_join() {
        assert_eq!(
            split("split", &json!("a,b,c"), &[]).unwrap(),
            json!(["a", "b", "c"])
        );
        assert_eq!(
            join("join", &json!(["a", 1, null]), &[json!("|")]).unwrap(),
            json!("a|1|")
        );
    }

    #[rstest]
    #[case(json!("4111111111111111"), vec![], "************1111")]
    #[case(json!("abc"), vec![], "***")]
    #[case(json!("secret"), vec![json!(2)], "****et")]
    fn test_mask(#[case] value: Value, #[case] args: Vec<Value>, #[case] expected: &str) {
        assert_eq!(mask("mask", &value, &args).unwrap(), json!(expected));
    }

    #[test]
    fn test_hash_sha256() {
        assert_eq!(
            hash("hash", &json!("abc"), &[]).unwrap(),
            json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_base64() {
        let encoded = base64_encode(&json!("hello"));
        assert_eq!(encoded, "aGVsbG8=");
        assert_eq!(
            base64_decode("base64_decode", &json!(encoded)).unwrap(),
            json!("hello")
        );
        assert!(base64_decode("base64_decode", &json!("***")).is_err());
    }

    #[rstest]
    #[case("Hi {}!", vec![], "Hi Ada!")]
    #[case("{0} {1}", vec![json!("Lovelace")], "Ada Lovelace")]
    #[case("{} is {}", vec![json!(36)], "Ada is 36")]
    #[case("{{literal}} {}", vec![], "{literal} Ada")]
    fn test_template(#[case] format: &str, #[case] extra: Vec<Value>, #[case] expected: &str) {
        let mut args = vec![json!(format)];
        args.extend(extra);
        assert_eq!(
            template("template", &json!("Ada"), &args).unwrap(),
            json!(expected)
        );
    }

    #[test]
    fn test_json_parse() {
        assert_eq!(
            json_parse("json_parse", json!("{\"a\":1}")).unwrap(),
            json!({"a": 1})
        );
        assert!(json_parse("json_parse", json!("{nope")).is_err());
    }
}
