// Parameter values, query strings and date coercion

use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Result, TapiError};

// Characters left untouched in a query: unreserved and reserved URI characters
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b',')
    .remove(b'[')
    .remove(b']');

pub const DAY_MONTH_YEAR: &str = "%d.%m.%Y";
pub const ISO_DATE: &str = "%Y-%m-%d";

// A request parameter or a search field value
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    Date(NaiveDate),
    List(Vec<Param>),
}

// Sorted by key, which keeps queries and cache fingerprints stable
pub type Params = BTreeMap<String, Param>;

impl Param {
    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null)
    }

    // Nothing, false, whitespace-only text or an empty list
    pub fn is_blank(&self) -> bool {
        match self {
            Param::Null => true,
            Param::Bool(value) => !value,
            Param::Text(text) => text.trim().is_empty(),
            Param::List(items) => items.is_empty(),
            Param::Integer(_) | Param::Date(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Text(text) => Some(text),
            _ => None,
        }
    }

    // Strict conversion: integers and integer text only
    pub fn to_integer(&self) -> Result<i64> {
        match self {
            Param::Integer(value) => Ok(*value),
            Param::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| TapiError::InvalidArgument(format!("invalid value for integer: {:?}", text))),
            other => Err(TapiError::TypeMismatch(format!(
                "cannot convert {:?} into an integer",
                other
            ))),
        }
    }

    // Lenient conversion: leading digits of text, 0 for anything unusable
    pub fn to_integer_lossy(&self) -> i64 {
        match self {
            Param::Integer(value) => *value,
            Param::Bool(_) | Param::Null | Param::Date(_) | Param::List(_) => 0,
            Param::Text(text) => {
                let text = text.trim_start();
                let (sign, digits) = match text.strip_prefix('-') {
                    Some(rest) => (-1, rest),
                    None => (1, text.strip_prefix('+').unwrap_or(text)),
                };
                let end = digits
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(digits.len());
                digits[..end].parse::<i64>().map_or(0, |value| sign * value)
            }
        }
    }

    // None for nothing or blank text, the rendered text otherwise
    pub fn to_text(&self) -> Option<String> {
        match self {
            Param::Null => None,
            Param::Text(text) if text.is_empty() => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Null => Ok(()),
            Param::Bool(value) => write!(f, "{}", value),
            Param::Integer(value) => write!(f, "{}", value),
            Param::Text(text) => f.write_str(text),
            Param::Date(date) => write!(f, "{}", date.format(ISO_DATE)),
            Param::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Integer(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Integer(value as i64)
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::Integer(value as i64)
    }
}

impl From<NaiveDate> for Param {
    fn from(value: NaiveDate) -> Self {
        Param::Date(value)
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(values: Vec<T>) -> Self {
        Param::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}

// Builds a parameter map from literal pairs
pub fn params<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Param>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

// key=value pairs in key order; lists expand into repeated key[]=value
fn query_elements(params: &Params) -> Vec<(String, String)> {
    let mut elements = Vec::new();
    for (key, value) in params {
        match value {
            Param::List(items) => {
                for item in items {
                    elements.push((format!("{}[]", key), item.to_string()));
                }
            }
            other => elements.push((key.clone(), other.to_string())),
        }
    }
    elements
}

pub fn append_query(url: &str, params: &Params) -> String {
    let elements = query_elements(params);
    if elements.is_empty() {
        return url.to_string();
    }

    let query = elements
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    let escaped = utf8_percent_encode(&query, QUERY_ESCAPE).to_string();
    let join_char = if url.contains('?') { '&' } else { '?' };

    format!("{}{}{}", url, join_char, escaped)
}

// Form fields for a POST body, using the same list convention as queries
pub fn form_fields(params: &Params) -> Vec<(String, String)> {
    query_elements(params)
}

pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, DAY_MONTH_YEAR)
        .or_else(|_| NaiveDate::parse_from_str(text, ISO_DATE))
        .map_err(|_| TapiError::TypeMismatch(format!("cannot parse {:?}", text)))
}

// Dates pass through, text is parsed, nothing stays nothing
pub fn coerce_date(value: &Param) -> Result<Option<NaiveDate>> {
    match value {
        Param::Date(date) => Ok(Some(*date)),
        Param::Text(text) => parse_date(text).map(Some),
        Param::Null => Ok(None),
        other => Err(TapiError::TypeMismatch(format!("cannot coerce {:?}", other))),
    }
}

// Normalizes a JSON object (form payload, config file) into plain string-keyed params
pub fn params_from_json(value: &serde_json::Value) -> Result<Params> {
    let object = value
        .as_object()
        .ok_or_else(|| TapiError::TypeMismatch(format!("expected an object, got {}", value)))?;

    object
        .iter()
        .map(|(key, value)| Ok((key.clone(), param_from_json(value)?)))
        .collect()
}

fn param_from_json(value: &serde_json::Value) -> Result<Param> {
    use serde_json::Value;

    Ok(match value {
        Value::Null => Param::Null,
        Value::Bool(flag) => Param::Bool(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Param::Integer(integer),
            None => Param::Text(number.to_string()),
        },
        Value::String(text) => Param::Text(text.clone()),
        Value::Array(items) => Param::List(
            items
                .iter()
                .map(param_from_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(_) => {
            return Err(TapiError::TypeMismatch(format!(
                "nested objects are not parameters: {}",
                value
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_append_query() {
        assert_eq!(append_query("url", &Params::new()), "url");
        assert_eq!(
            append_query("url", &params([("param1", Param::from(1)), ("param2", "zwo".into())])),
            "url?param1=1&param2=zwo"
        );
        assert_eq!(
            append_query(
                "url?already=here",
                &params([("param1", Param::from(1)), ("param2", "zwo".into())])
            ),
            "url?already=here&param1=1&param2=zwo"
        );
        assert_eq!(
            append_query("url", &params([("array", vec![1, 2])])),
            "url?array[]=1&array[]=2"
        );
        assert_eq!(
            append_query("url", &params([("umlaut", "ü")])),
            "url?umlaut=%C3%BC"
        );
    }

    #[test]
    fn test_append_query_sorts_by_key() {
        let query = append_query("url", &params([("zeta", "z"), ("alpha", "a"), ("mid", "m")]));
        assert_eq!(query, "url?alpha=a&mid=m&zeta=z");
    }

    #[test]
    fn test_append_query_renders_null_and_dates() {
        let date = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        let query = append_query(
            "url",
            &params([("empty", Param::Null), ("on", Param::from(date))]),
        );
        assert_eq!(query, "url?empty=&on=2099-01-01");
    }

    #[test]
    fn test_form_fields_expand_lists() {
        let fields = form_fields(&params([("ids", Param::from(vec![3, 4])), ("key", "k".into())]));
        assert_eq!(
            fields,
            vec![
                ("ids[]".to_string(), "3".to_string()),
                ("ids[]".to_string(), "4".to_string()),
                ("key".to_string(), "k".to_string()),
            ]
        );
    }

    #[test_case("01.01.2099"; "day month year")]
    #[test_case("2099-01-01"; "iso")]
    fn test_coerce_date_formats(text: &str) {
        let expected = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        assert_eq!(coerce_date(&Param::from(text)).unwrap(), Some(expected));
    }

    #[test_case(Param::from("not-a-date"); "garbage text")]
    #[test_case(Param::from("2099/01/01"); "unsupported separator")]
    #[test_case(Param::from(20990101); "integer")]
    #[test_case(Param::from(true); "boolean")]
    fn test_coerce_date_rejects(value: Param) {
        assert!(matches!(coerce_date(&value), Err(TapiError::TypeMismatch(_))));
    }

    #[test]
    fn test_coerce_date_passes_dates_and_nothing() {
        let date = NaiveDate::from_ymd_opt(2030, 5, 17).unwrap();
        assert_eq!(coerce_date(&Param::Date(date)).unwrap(), Some(date));
        assert_eq!(coerce_date(&Param::Null).unwrap(), None);
    }

    #[test]
    fn test_params_from_json() {
        let value = serde_json::json!({
            "city_id": 1,
            "arrival_date": "01.01.2099",
            "one_way": true,
            "ids": [1, "two"],
            "price": 1.5,
            "nothing": null
        });

        let params = params_from_json(&value).unwrap();
        assert_eq!(params["city_id"], Param::Integer(1));
        assert_eq!(params["arrival_date"], Param::from("01.01.2099"));
        assert_eq!(params["one_way"], Param::Bool(true));
        assert_eq!(
            params["ids"],
            Param::List(vec![Param::Integer(1), Param::from("two")])
        );
        assert_eq!(params["price"], Param::from("1.5"));
        assert!(params["nothing"].is_null());
    }

    #[test]
    fn test_params_from_json_rejects_nested_objects() {
        let value = serde_json::json!({"nested": {"a": 1}});
        assert!(matches!(
            params_from_json(&value),
            Err(TapiError::TypeMismatch(_))
        ));
        assert!(params_from_json(&serde_json::json!([1, 2])).is_err());
    }

    #[test_case(Param::from(3), 3; "integer")]
    #[test_case(Param::from("12 adults"), 12; "leading digits")]
    #[test_case(Param::from("-4"), -4; "negative")]
    #[test_case(Param::from("abc"), 0; "no digits")]
    #[test_case(Param::Null, 0; "nothing")]
    fn test_lossy_integer(value: Param, expected: i64) {
        assert_eq!(value.to_integer_lossy(), expected);
    }

    #[test]
    fn test_strict_integer() {
        assert_eq!(Param::from(" 2 ").to_integer().unwrap(), 2);
        assert!(matches!(
            Param::from("two").to_integer(),
            Err(TapiError::InvalidArgument(_))
        ));
        assert!(matches!(
            Param::Null.to_integer(),
            Err(TapiError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_blank_values() {
        assert!(Param::Null.is_blank());
        assert!(Param::from("  ").is_blank());
        assert!(Param::List(vec![]).is_blank());
        assert!(!Param::from(0).is_blank());
        assert!(!Param::from("x").is_blank());
    }
}
